use chrono::NaiveDate;
use chroni_core::db::RecordFilter;
use chroni_core::JournalClient;

use crate::cli::EntryKind;
use crate::commands::common::{format_record_lines, record_to_list_item, RecordListItem};
use crate::error::CliError;

pub fn build_filter(
    limit: usize,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    entry_type: Option<EntryKind>,
) -> RecordFilter {
    let filter = RecordFilter::default().between(from, to).limit(limit);
    match entry_type {
        Some(kind) => filter.of_type(kind.into()),
        None => filter,
    }
}

pub async fn run_list(
    filter: &RecordFilter,
    as_json: bool,
    client: &JournalClient,
) -> Result<(), CliError> {
    let records = client.entries(filter).await?;

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No entries yet.");
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}
