use chroni_core::sync::{ImportDecision, ImportOutcome};
use chroni_core::JournalClient;

use crate::cli::ImportChoice;
use crate::error::CliError;

impl From<ImportChoice> for ImportDecision {
    fn from(choice: ImportChoice) -> Self {
        match choice {
            ImportChoice::Accept => Self::Accept,
            ImportChoice::Decline => Self::Decline,
        }
    }
}

pub fn describe_import(owner_id: &str, outcome: &ImportOutcome) -> String {
    if outcome.declined {
        return format!("Kept local entries unbound; account {owner_id} will not be asked again");
    }
    format!(
        "Bound {} entries to {owner_id}: {} synced, {} queued",
        outcome.bound, outcome.pushed, outcome.queued
    )
}

pub async fn run_import(
    owner_id: &str,
    choice: ImportChoice,
    client: &JournalClient,
) -> Result<(), CliError> {
    let outcome = client
        .import_local_records(owner_id, choice.into())
        .await?;
    println!("{}", describe_import(owner_id, &outcome));
    Ok(())
}
