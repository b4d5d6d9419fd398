//! Services shared by every client surface.

mod client;
mod local_store;

pub use client::{ClientComponents, JournalClient, DATABASE_FILE, FALLBACK_STORAGE_FILE};
pub use local_store::LocalStore;
