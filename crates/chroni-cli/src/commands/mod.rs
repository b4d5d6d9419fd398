pub mod add;
pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod import;
pub mod insight;
pub mod list;
pub mod show;
pub mod status;
pub mod summary;
pub mod sync;
pub mod trends;
