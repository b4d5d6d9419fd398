use chroni_core::sync::SyncStatus;
use chroni_core::JournalClient;

use crate::error::CliError;

pub fn format_status_lines(status: &SyncStatus) -> Vec<String> {
    vec![
        format!("mode:          {}", status.mode),
        format!("connectivity:  {}", if status.online { "online" } else { "offline" }),
        format!("entries:       {} ({} not yet synced)", status.records, status.unsynced),
        format!("queue:         {} pending, {} parked", status.pending, status.parked),
        format!("storage tier:  {}", status.storage_tier),
    ]
}

pub async fn run_status(as_json: bool, client: &JournalClient) -> Result<(), CliError> {
    let status = client.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}
