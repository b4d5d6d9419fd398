use std::env;
use std::path::PathBuf;

use chrono::Utc;
use chroni_core::config::ClientConfig;
use chroni_core::{ClientComponents, JournalClient, Record, RecordId};
use serde::Serialize;

use crate::error::CliError;

const ENV_DATA_DIR: &str = "CHRONI_DATA_DIR";
const ENV_CONFIG_PATH: &str = "CHRONI_CONFIG";

/// Filesystem locations the CLI works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn resolve(
        cli_data_dir: Option<PathBuf>,
        cli_config: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let data_dir = match cli_data_dir.or_else(|| env::var_os(ENV_DATA_DIR).map(PathBuf::from)) {
            Some(path) => path,
            None => dirs::data_dir()
                .ok_or(CliError::NoDefaultDir("data"))?
                .join("chroni"),
        };
        let config_path =
            match cli_config.or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from)) {
                Some(path) => path,
                None => dirs::config_dir()
                    .ok_or(CliError::NoDefaultDir("config"))?
                    .join("chroni")
                    .join("config.json"),
            };
        Ok(Self {
            data_dir,
            config_path,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub entry_type: String,
    pub date: String,
    pub mood: Option<u8>,
    pub energy: Option<u8>,
    pub pain: Option<u8>,
    pub synced: bool,
    pub relative_time: String,
}

/// Config file plus `CHRONI_*` environment overrides.
pub fn load_config(paths: &AppPaths) -> Result<ClientConfig, CliError> {
    Ok(ClientConfig::load(&paths.config_path)?.with_env_overrides()?)
}

/// Build a client from config and run its startup resync.
pub async fn open_client(paths: &AppPaths) -> Result<JournalClient, CliError> {
    let config = load_config(paths)?;
    let components = ClientComponents::from_config(&config, &paths.data_dir).await?;
    let client = JournalClient::new(components);

    let startup = client.start().await?;
    tracing::debug!("Startup sync pass: {startup:?}");
    Ok(client)
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a record by exact id, then by unique id prefix.
pub async fn resolve_record(query: &str, client: &JournalClient) -> Result<Record, CliError> {
    let query = normalize_record_identifier(query)?;
    if let Some(record) = client.entry(&RecordId::from(query.as_str())).await? {
        return Ok(record);
    }

    let mut matching = client
        .store()
        .list_all()
        .await?
        .into_iter()
        .filter(|record| record.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::RecordNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|record| short_id(&record.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let sync_marker = if record.synced { " " } else { "*" };
            format!(
                "{:<13}{sync_marker} {}  {:<7}  {:<28}  {}",
                short_id(&record.id),
                record.date,
                record.entry_type,
                format_metrics(record),
                format_relative_time(record.timestamp, now_ms)
            )
        })
        .collect()
}

/// `mood 7 energy 5` style summary of the metrics that are set.
pub fn format_metrics(record: &Record) -> String {
    record
        .metrics()
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| format!("{name} {value}")))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn record_to_list_item(record: &Record) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    RecordListItem {
        id: record.id.to_string(),
        entry_type: record.entry_type.to_string(),
        date: record.date.to_string(),
        mood: record.mood,
        energy: record.energy,
        pain: record.pain,
        synced: record.synced,
        relative_time: format_relative_time(record.timestamp, now_ms),
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn join_words(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
