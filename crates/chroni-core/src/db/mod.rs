//! Database layer for Chroni

mod connection;
mod kv_repository;
mod migrations;
mod pending_repository;
mod record_repository;

pub use connection::Database;
pub use kv_repository::{KvRepository, LibSqlKvRepository};
pub use pending_repository::{LibSqlPendingRepository, PendingRepository};
pub use record_repository::{LibSqlRecordRepository, RecordFilter, RecordRepository};
