use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lyra_core::{ContentType, EntityKind, SettingKey};

#[derive(Parser)]
#[command(name = "lyra")]
#[command(about = "Record likes, views, searches and settings, and sync them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Like a piece of content
    Like {
        /// Catalog content id (R…, A… or T…)
        content_id: String,
        /// Content type (inferred from the id prefix when omitted)
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_content_type)]
        content_type: Option<ContentType>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a like
    Unlike {
        /// Catalog content id
        content_id: String,
        /// Content type (inferred from the id prefix when omitted)
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_content_type)]
        content_type: Option<ContentType>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a content view, or list recent views
    View {
        /// Catalog content id (lists recent views when omitted)
        content_id: Option<String>,
        /// Content type (inferred from the id prefix when omitted)
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_content_type)]
        content_type: Option<ContentType>,
        /// Number of views to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Local search history
    Search {
        #[command(subcommand)]
        command: SearchCommands,
    },
    /// User settings
    Setting {
        #[command(subcommand)]
        command: SettingCommands,
    },
    /// Sync local changes with the remote
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Keep running and sync on a timer until interrupted
        #[arg(long)]
        watch: bool,
        /// Only sync one kind (liked_content, settings, viewed_content)
        #[arg(long, value_name = "KIND", value_parser = parse_entity_kind)]
        kind: Option<EntityKind>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync status per kind
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show storage pressure for the data directory
    Storage {
        /// Also check whether this many bytes fit (keeping the buffer free)
        #[arg(long, value_name = "BYTES")]
        check: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SearchCommands {
    /// Remember a search that led to a result
    Add {
        /// Search query
        query: String,
        /// Content id of the chosen result
        content_id: String,
        /// Content type (inferred from the id prefix when omitted)
        #[arg(long = "type", value_name = "TYPE", value_parser = parse_content_type)]
        content_type: Option<ContentType>,
    },
    /// List recent searches
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove all search history
    Clear,
}

#[derive(Subcommand)]
pub enum SettingCommands {
    /// Show one setting
    Get {
        #[arg(value_parser = parse_setting_key)]
        key: SettingKey,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a setting
    Set {
        #[arg(value_parser = parse_setting_key)]
        key: SettingKey,
        /// New value (true or false)
        value: String,
    },
    /// Reset a setting to its default
    Reset {
        #[arg(value_parser = parse_setting_key)]
        key: SettingKey,
    },
    /// Show every setting with its effective value
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn parse_content_type(value: &str) -> Result<ContentType, String> {
    value.parse().map_err(|error: lyra_core::Error| error.to_string())
}

pub fn parse_setting_key(value: &str) -> Result<SettingKey, String> {
    value.parse().map_err(|error: lyra_core::Error| error.to_string())
}

pub fn parse_entity_kind(value: &str) -> Result<EntityKind, String> {
    value.parse().map_err(|error: lyra_core::Error| error.to_string())
}
