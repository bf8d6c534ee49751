use almanac_core::auth::SessionPersistence;

use crate::cli::AuthCommands;
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, context: &CliContext) -> Result<(), CliError> {
    let client = context.auth_client()?;
    match command {
        AuthCommands::Login { email, password } => {
            let session = client.sign_in(&email, &password).await?;
            let email_label = session.user.email.as_deref().unwrap_or("(no email)");
            println!("Signed in as {email_label}");
        }
        AuthCommands::Status => match client.restore_session().await? {
            Some(session) => {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Signed in as {} (user {}, expires_at={})",
                    email_label, session.user.id, session.expires_at
                );
            }
            None => println!("Not signed in."),
        },
        AuthCommands::Logout => {
            if let Some(session) = client.store().load_session()? {
                if let Err(error) = client.sign_out(&session.access_token).await {
                    // Forget the session locally even when the backend can't be reached
                    tracing::warn!("Remote sign-out failed: {}", error);
                    client.store().clear_session()?;
                }
            }
            println!("Signed out");
        }
    }
    Ok(())
}
