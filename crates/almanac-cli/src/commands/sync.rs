use std::path::PathBuf;

use almanac_core::sync::{MergeReport, PendingOperation, SyncReport};
use almanac_core::SyncOutcome;
use serde::Serialize;

use crate::commands::common::print_json;
use crate::context::CliContext;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub supabase_configured: bool,
    pub signed_in: bool,
    pub user_id: Option<String>,
    pub online: bool,
    pub persistent_storage: bool,
    pub database_path: PathBuf,
    pub pending_operations: usize,
}

pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    if context.config.supabase()?.is_none() {
        return Err(CliError::SyncNotConfigured);
    }
    let almanac = context.open().await?;
    if context.offline {
        almanac.teardown();
        return Err(CliError::InvalidInput(
            "Cannot sync with --offline".to_string(),
        ));
    }
    if almanac.session().principal().is_none() {
        almanac.teardown();
        return Err(CliError::NotSignedIn);
    }

    let outcome = almanac.sync_now().await;
    almanac.teardown();
    match outcome {
        SyncOutcome::Synced(report) => {
            for line in format_sync_report(&report) {
                println!("{line}");
            }
            Ok(())
        }
        SyncOutcome::Failed(message) => Err(CliError::SyncFailed(message)),
        // A forced sign-out during the flush ends the session before the cycle
        SyncOutcome::Skipped => Err(CliError::NotSignedIn),
        SyncOutcome::Coalesced => {
            println!("Sync already running");
            Ok(())
        }
    }
}

pub async fn run_status(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let almanac = context.open().await?;
    let principal = almanac.session().principal();
    let connectivity = almanac.session().connectivity();
    let report = StatusReport {
        supabase_configured: context.config.supabase()?.is_some(),
        signed_in: principal.is_some(),
        user_id: principal.map(|principal| principal.user_id),
        online: connectivity.online,
        persistent_storage: almanac.is_persistent(),
        database_path: context.database_path.clone(),
        pending_operations: almanac.pending_operations().await.len(),
    };
    almanac.teardown();

    if as_json {
        return print_json(&report);
    }
    println!(
        "Backend:   {}",
        if report.supabase_configured {
            "Supabase"
        } else {
            "not configured (local only)"
        }
    );
    match &report.user_id {
        Some(user_id) => println!("Session:   signed in as {user_id}"),
        None => println!("Session:   signed out"),
    }
    println!(
        "Network:   {}",
        if report.online { "online" } else { "offline" }
    );
    println!(
        "Storage:   {} ({})",
        report.database_path.display(),
        if report.persistent_storage {
            "persistent"
        } else {
            "memory only"
        }
    );
    println!("Pending:   {}", report.pending_operations);
    Ok(())
}

pub async fn run_pending(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let almanac = context.open().await?;
    let pending = almanac.pending_operations().await;
    almanac.teardown();

    if as_json {
        return print_json(&pending);
    }
    if pending.is_empty() {
        println!("Nothing pending.");
        return Ok(());
    }
    for line in format_pending_lines(&pending) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_pending_lines(pending: &[PendingOperation]) -> Vec<String> {
    pending
        .iter()
        .map(|operation| {
            format!(
                "{}  {:<6}  {:<9}  {}",
                operation.timestamp,
                operation.action.as_str(),
                operation.entity_kind.table(),
                operation.entity_id
            )
        })
        .collect()
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: {} replayed, {} discarded, {} still pending",
        report.flushed.replayed, report.flushed.discarded, report.flushed.remaining
    )];
    for (label, merge) in [
        ("events", &report.events),
        ("contacts", &report.contacts),
        ("occasions", &report.occasions),
    ] {
        lines.push(format_merge_line(label, merge));
    }
    lines
}

fn format_merge_line(label: &str, merge: &MergeReport) -> String {
    format!(
        "  {label}: {} pulled, {} pushed, {} updated from remote",
        merge.remote_only, merge.local_only, merge.remote_wins
    )
}
