use chrono::Local;
use chroni_core::sync::PushOutcome;
use chroni_core::{JournalClient, Record};

use crate::cli::{AddArgs, EntryKind};
use crate::commands::common::join_words;
use crate::error::CliError;

/// Turn command-line flags into a new record.
pub fn build_record(args: &AddArgs) -> Record {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let mut record = Record::new(args.entry_type.into(), date);
    record.mood = args.mood;
    record.energy = args.energy;
    record.anxiety = args.anxiety;
    record.pain = args.pain;
    record.fatigue = args.fatigue;
    record.sleep_quality = args.sleep.map(Into::into);

    let note = join_words(&args.note);
    match args.entry_type {
        EntryKind::Morning => record.morning_feeling = note,
        EntryKind::Evening => record.evening_day_review = note,
    }
    record
}

pub fn describe_push(outcome: Option<&PushOutcome>) -> String {
    match outcome {
        None | Some(PushOutcome::LocalOnly) => "saved on this device".to_string(),
        Some(PushOutcome::Confirmed) => "saved and synced".to_string(),
        Some(PushOutcome::QueuedOffline) => "saved offline; will sync when online".to_string(),
        Some(PushOutcome::Queued(error)) => format!("saved; sync deferred ({error})"),
        Some(PushOutcome::Superseded) => "saved; a newer version is syncing".to_string(),
        Some(PushOutcome::StoreFailed(error)) => {
            format!("saved; sync bookkeeping failed ({error})")
        }
    }
}

pub async fn run_add(args: &AddArgs, client: &JournalClient) -> Result<(), CliError> {
    let submission = client.submit(build_record(args)).await?;
    let id = submission.record.id.clone();
    let outcome = match submission.settled().await {
        Some(outcome) => Some(outcome),
        None if client.engine().queue().contains(&id).await? => Some(PushOutcome::QueuedOffline),
        None => None,
    };

    println!("{id}");
    eprintln!("{}", describe_push(outcome.as_ref()));
    Ok(())
}
