use chroni_core::JournalClient;

use crate::commands::common::resolve_record;
use crate::error::CliError;

pub async fn run_show(id: &str, client: &JournalClient) -> Result<(), CliError> {
    let record = resolve_record(id, client).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
