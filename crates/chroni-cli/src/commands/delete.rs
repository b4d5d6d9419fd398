use chroni_core::JournalClient;

use crate::commands::common::resolve_record;
use crate::error::CliError;

pub async fn run_delete(id: &str, client: &JournalClient) -> Result<(), CliError> {
    let record = resolve_record(id, client).await?;

    client.delete_entry(&record.id).await?;
    println!("{}", record.id);
    Ok(())
}
