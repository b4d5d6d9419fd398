use std::time::Duration;

use chroni_core::config::ClientConfig;
use chroni_core::sync::{ResyncReport, SyncMode, SyncPass};
use chroni_core::JournalClient;

use crate::error::CliError;

/// Used by `--watch` when the config sets no resync interval.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(300);

pub fn watch_interval(config: &ClientConfig) -> Duration {
    config.resync_interval().unwrap_or(DEFAULT_WATCH_INTERVAL)
}

pub fn describe_resync(pass: &SyncPass<ResyncReport>) -> Vec<String> {
    match pass {
        SyncPass::Ran(report) => {
            let mut lines = vec![format!(
                "Replayed {} queued entries ({} already synced, {} parked)",
                report.drain.replayed.len(),
                report.drain.already_synced,
                report.drain.parked
            )];
            if let Some(error) = &report.drain.halted_by {
                lines.push(format!("Replay stopped early: {error}"));
            }
            match &report.merge {
                Some(merge) => lines.push(format!(
                    "Merged remote copy: {} imported, {} reconciled, {} unchanged, {} malformed",
                    merge.imported, merge.reconciled, merge.unchanged, merge.malformed
                )),
                None => lines.push("Remote copy not merged".to_string()),
            }
            lines
        }
        SyncPass::Skipped => vec!["Another sync is already running".to_string()],
        SyncPass::Unavailable => vec!["Remote is unreachable; entries stay queued".to_string()],
        SyncPass::Failed(error) => vec![format!("Sync failed: {error}")],
    }
}

pub async fn run_sync(
    release_parked: bool,
    watch: Option<Duration>,
    client: &JournalClient,
) -> Result<(), CliError> {
    if matches!(client.engine().mode(), SyncMode::LocalOnly) {
        return Err(CliError::RemoteNotConfigured);
    }

    if release_parked {
        let released = client.engine().queue().release_parked().await?;
        println!("Released {released} parked entries");
    }

    let pass = client.sync_now().await?;
    for line in describe_resync(&pass) {
        println!("{line}");
    }

    if let Some(interval) = watch {
        client.start_periodic_resync(interval);
        println!(
            "Resyncing every {}s; press Ctrl-C to stop",
            interval.as_secs()
        );
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
