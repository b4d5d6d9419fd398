//! Data models for Chroni

mod cache_entry;
mod pending;
mod record;
mod summary;

pub use cache_entry::{CacheEntry, CACHE_TTL_HOURS};
pub use pending::PendingOperation;
pub use record::{EntryType, Record, RecordId, SleepQuality, METRIC_MAX};
pub use summary::{average, EntrySummary, RecentAverages, TrendSeries};
