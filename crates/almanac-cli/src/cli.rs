use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Offline-first calendar and contact book")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the local database
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Work against the local store only; nothing is sent to the backend
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage calendar events
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },
    /// Manage contacts
    Contact {
        #[command(subcommand)]
        command: ContactCommands,
    },
    /// Manage birthdays, anniversaries and other occasions
    Occasion {
        #[command(subcommand)]
        command: OccasionCommands,
    },
    /// Replay pending changes and merge with the backend
    Sync,
    /// Show session, storage and sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List changes waiting to be sent to the backend
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the Supabase session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Inspect or update the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum EventCommands {
    /// Create an event
    #[command(alias = "new")]
    Add {
        title: String,
        /// Start: RFC 3339, `YYYY-MM-DD HH:MM` (local time) or `YYYY-MM-DD`
        #[arg(long, value_name = "WHEN")]
        start: String,
        /// Optional end, same formats as --start
        #[arg(long, value_name = "WHEN")]
        end: Option<String>,
        #[arg(long)]
        all_day: bool,
        #[arg(long)]
        description: Option<String>,
        /// Display color, e.g. `#3b82f6`
        #[arg(long)]
        color: Option<String>,
    },
    /// List events
    List {
        /// Include events that already ended
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an event
    Edit {
        /// Event ID or unique ID prefix
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_name = "WHEN")]
        start: Option<String>,
        #[arg(long, value_name = "WHEN")]
        end: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an event
    Delete {
        /// Event ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ContactCommands {
    /// Create a contact
    #[command(alias = "new")]
    Add {
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List contacts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a contact
    Edit {
        /// Contact ID or unique ID prefix
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a contact; its occasions are kept and detached
    Delete {
        /// Contact ID or unique ID prefix
        id: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OccasionKindArg {
    Birthday,
    Anniversary,
    Other,
}

#[derive(Subcommand)]
pub enum OccasionCommands {
    /// Create an occasion
    #[command(alias = "new")]
    Add {
        title: String,
        /// Original date, `YYYY-MM-DD`
        #[arg(long)]
        date: String,
        #[arg(long, value_enum, default_value_t = OccasionKindArg::Birthday)]
        kind: OccasionKindArg,
        /// Contact ID or unique ID prefix to attach to
        #[arg(long)]
        contact: Option<String>,
        /// Happens once instead of every year
        #[arg(long)]
        once: bool,
        /// Days before the occurrence to remind
        #[arg(long, default_value = "1")]
        remind_days: u32,
        #[arg(long)]
        no_reminder: bool,
    },
    /// List occasions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Occasions falling within the next days
    Upcoming {
        #[arg(short, long, default_value = "30")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an occasion
    Delete {
        /// Occasion ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        /// Read from ALMANAC_PASSWORD when omitted
        #[arg(long, env = "ALMANAC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show whether a session is stored
    Status,
    /// Revoke and forget the stored session
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved configuration
    Show,
    /// Print the config file location
    Path,
    /// Write values to the config file
    Set {
        #[arg(long)]
        supabase_url: Option<String>,
        #[arg(long)]
        supabase_anon_key: Option<String>,
        #[arg(long, value_name = "PATH")]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        debounce_ms: Option<u64>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}
