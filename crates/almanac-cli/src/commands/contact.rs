use almanac_core::Contact;

use crate::cli::ContactCommands;
use crate::commands::common::{
    finish_mutation, optional_text, print_json, required_text, resolve_entity,
};
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_contact(command: ContactCommands, context: &CliContext) -> Result<(), CliError> {
    let almanac = context.open().await?;
    match command {
        ContactCommands::Add {
            name,
            email,
            phone,
            notes,
        } => {
            let mut contact = Contact::new(required_text("Name", &name)?);
            contact.email = optional_text(email);
            contact.phone = optional_text(phone);
            contact.notes = optional_text(notes);

            let contact = almanac.contacts().add(contact).await?;
            println!("{}", contact.id);
            finish_mutation(&almanac).await;
        }
        ContactCommands::List { json } => {
            let mut contacts = almanac.contacts().items();
            contacts.sort_by_key(|contact| contact.name.to_lowercase());
            if json {
                print_json(&contacts)?;
            } else if contacts.is_empty() {
                println!("No contacts.");
            } else {
                for contact in &contacts {
                    println!("{}", format_contact_line(contact));
                }
            }
            almanac.teardown();
        }
        ContactCommands::Edit {
            id,
            name,
            email,
            phone,
            notes,
        } => {
            let existing = resolve_entity(almanac.contacts(), &id)?;
            let name = name.as_deref().map(|n| required_text("Name", n)).transpose()?;
            let updated = almanac
                .contacts()
                .update(&existing.id, |contact| {
                    if let Some(name) = name {
                        contact.name = name;
                    }
                    // Passing an empty value clears the field
                    if email.is_some() {
                        contact.email = optional_text(email);
                    }
                    if phone.is_some() {
                        contact.phone = optional_text(phone);
                    }
                    if notes.is_some() {
                        contact.notes = optional_text(notes);
                    }
                })
                .await?;
            println!("{}", updated.id);
            finish_mutation(&almanac).await;
        }
        ContactCommands::Delete { id } => {
            let contact = resolve_entity(almanac.contacts(), &id)?;
            almanac.delete_contact(&contact.id).await?;
            println!("{}", contact.id);
            finish_mutation(&almanac).await;
        }
    }
    Ok(())
}

pub fn format_contact_line(contact: &Contact) -> String {
    let reach = [contact.email.as_deref(), contact.phone.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    if reach.is_empty() {
        format!("{}  [{}] {}", contact.id, contact.initials(), contact.name)
    } else {
        format!(
            "{}  [{}] {} <{}>",
            contact.id,
            contact.initials(),
            contact.name,
            reach
        )
    }
}
