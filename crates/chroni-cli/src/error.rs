use std::io;

use chroni_core::insights::AiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] chroni_core::Error),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Entry ID cannot be empty")]
    EmptyRecordId,
    #[error("Question cannot be empty")]
    EmptyQuestion,
    #[error("Entry not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Could not resolve the {0} directory; pass --data-dir/--config or set CHRONI_DATA_DIR")]
    NoDefaultDir(&'static str),
    #[error(
        "No journal backend is configured. Run `chroni config init --api-base-url <URL>` or set CHRONI_API_URL."
    )]
    RemoteNotConfigured,
}
