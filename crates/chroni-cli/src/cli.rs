use std::path::PathBuf;

use chrono::NaiveDate;
use chroni_core::insights::{DEFAULT_PREDICTION_DAYS, DEFAULT_TREND_DAYS};
use chroni_core::{EntryType, SleepQuality};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "chroni")]
#[command(about = "Offline-first health journal for the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the local journal database
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Path to the client config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a morning or evening check-in
    #[command(alias = "new")]
    Add(AddArgs),
    /// List recent check-ins
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only entries on or after this day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<NaiveDate>,
        /// Only entries on or before this day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: Option<NaiveDate>,
        /// Only morning or evening entries
        #[arg(long = "type", value_enum)]
        entry_type: Option<EntryKind>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single check-in
    Show {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Delete a check-in from this device
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Replay pending writes and merge the remote copy
    Sync {
        /// Re-arm entries the remote rejected too many times first
        #[arg(long)]
        release_parked: bool,
        /// Keep running and resync periodically until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Show sync and storage status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entry totals and recent averages
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-entry mood, energy, pain, anxiety and fatigue over recent days
    Trends {
        /// Window size in days, today included
        #[arg(long, default_value_t = DEFAULT_TREND_DAYS)]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the AI collaborator about your journal
    Insight {
        #[command(subcommand)]
        command: InsightCommands,
    },
    /// Bind entries written before sign-in to an account
    Import {
        /// Account that should own the entries
        #[arg(long, value_name = "ID")]
        owner: String,
        /// Whether to import or keep the entries unbound
        #[arg(value_enum)]
        decision: ImportChoice,
    },
    /// Read or write the client config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub struct AddArgs {
    /// Check-in kind
    #[arg(value_enum)]
    pub entry_type: EntryKind,
    /// Day the entry describes (defaults to today)
    #[arg(long, value_name = "DATE")]
    pub date: Option<NaiveDate>,
    /// Overall mood, 0-10
    #[arg(long)]
    pub mood: Option<u8>,
    /// Energy level, 0-10
    #[arg(long)]
    pub energy: Option<u8>,
    /// Anxiety level, 0-10
    #[arg(long)]
    pub anxiety: Option<u8>,
    /// Pain level, 0-10
    #[arg(long)]
    pub pain: Option<u8>,
    /// Fatigue level, 0-10
    #[arg(long)]
    pub fatigue: Option<u8>,
    /// Sleep quality of the previous night
    #[arg(long, value_enum)]
    pub sleep: Option<SleepRating>,
    /// Free-form note
    #[arg(long, num_args = 1..)]
    pub note: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum EntryKind {
    #[default]
    Morning,
    Evening,
}

impl From<EntryKind> for EntryType {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Morning => Self::Morning,
            EntryKind::Evening => Self::Evening,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SleepRating {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl From<SleepRating> for SleepQuality {
    fn from(rating: SleepRating) -> Self {
        match rating {
            SleepRating::Excellent => Self::Excellent,
            SleepRating::Good => Self::Good,
            SleepRating::Fair => Self::Fair,
            SleepRating::Poor => Self::Poor,
            SleepRating::VeryPoor => Self::VeryPoor,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ImportChoice {
    Accept,
    Decline,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum InsightCommands {
    /// Today's insight from recent entries
    Daily,
    /// Reflection over the last seven days
    Weekly,
    /// Patterns likely to carry into the coming days
    Predict {
        /// Window size in days, today included
        #[arg(long, default_value_t = DEFAULT_PREDICTION_DAYS)]
        days: u32,
    },
    /// Short summary of one entry
    Entry {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Free-form question answered from recent entries
    Ask {
        /// Question text
        question: Vec<String>,
    },
    /// Number of AI requests made today
    Usage,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Create or update the config file
    Init {
        /// Journal backend base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Reachability probe base URL (defaults to the backend)
        #[arg(long, value_name = "URL")]
        probe_url: Option<String>,
        /// Account that owns new entries
        #[arg(long, value_name = "ID")]
        owner_id: Option<String>,
        /// OpenAI-compatible API base URL
        #[arg(long, value_name = "URL")]
        ai_base_url: Option<String>,
        /// Model name for insights
        #[arg(long, value_name = "NAME")]
        ai_model: Option<String>,
        /// Seconds between background resyncs
        #[arg(long, value_name = "SECS")]
        resync_interval_secs: Option<u64>,
    },
}
