//! chroni-core - Core library for Chroni
//!
//! Offline-first persistence and synchronization for a personal health
//! journal: the durable local store, the pending operations queue, the
//! sync engine, fallback key/value storage and the time-boxed insight cache.
//! Every client surface (currently the CLI) goes through [`JournalClient`].

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod insights;
pub mod kv;
pub mod models;
pub mod queue;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntryType, Record, RecordId, SleepQuality};
pub use services::{ClientComponents, JournalClient, LocalStore};

#[cfg(test)]
mod tests;
