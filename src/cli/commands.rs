use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::db::Database;
use crate::errors::StoreError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version line with build metadata when the build script could record it.
pub fn long_version() -> String {
    let hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let built = option_env!("BUILD_TIMESTAMP").unwrap_or("unknown");
    format!("{} ({} built {})", VERSION, hash, built)
}

#[derive(Parser)]
#[command(name = "proxystore", version, about = "Inspect and maintain proxy session stores")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show backend, schema and row counts of a store
    Info(InfoArgs),
    /// List stored alerts
    Alerts(AlertsArgs),
    /// List stored sessions
    Sessions(SessionsArgs),
    /// Compact a store, optionally purging transient rows
    Compact(CompactArgs),
    /// Delete a session: its files (embedded) or its rows (generic)
    DeleteSession(DeleteSessionArgs),
    /// Delete every row scoped to a session id
    DiscardSession(DiscardSessionArgs),
    /// Print version and build information
    Version,
}

/// Where the store lives.
#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    /// Embedded session path (the data lives in <PATH>.data)
    #[arg(short, long, conflicts_with = "config_dir")]
    pub path: Option<PathBuf>,

    /// Directory holding db.properties and the dialect dictionary
    #[arg(short = 'd', long)]
    pub config_dir: Option<PathBuf>,

    /// Database URL overriding db.url
    #[arg(long, requires = "config_dir")]
    pub url: Option<String>,
}

impl StoreArgs {
    pub fn has_locator(&self) -> bool {
        self.path.is_some() || self.config_dir.is_some()
    }

    /// The configured database, not yet opened.
    pub fn database(&self) -> Result<Database, StoreError> {
        match &self.config_dir {
            Some(dir) => Database::from_config_dir(dir),
            None => Database::embedded(),
        }
    }

    pub fn open(&self) -> Result<Database, StoreError> {
        let db = self.database()?;
        match (&self.path, &self.url, &self.config_dir) {
            (Some(path), _, _) => db.open(&path.to_string_lossy())?,
            (None, Some(url), _) => db.open(url)?,
            (None, None, Some(_)) => db.open_default()?,
            (None, None, None) => {
                return Err(StoreError::Config("Either --path or --config-dir is required".into()));
            }
        }
        Ok(db)
    }
}

#[derive(Args, Clone)]
pub struct InfoArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct AlertsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Only alerts of this session
    #[arg(long, conflicts_with = "scan")]
    pub session: Option<i64>,

    /// Only alerts of this scan
    #[arg(long)]
    pub scan: Option<i64>,

    /// Include the tags of each alert
    #[arg(long)]
    pub tags: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct SessionsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct CompactArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Also delete temporary history and orphaned alert metadata/tags
    #[arg(long)]
    pub cleanup: bool,
}

#[derive(Args, Clone)]
pub struct DeleteSessionArgs {
    /// Session path (embedded) or session name (generic)
    pub name: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Clone)]
pub struct DiscardSessionArgs {
    /// Session id
    pub session_id: i64,

    #[command(flatten)]
    pub store: StoreArgs,
}
