use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vodhub::sites::Direction;

/// Query and maintain a collection of CMS10 VOD sites
#[derive(Parser)]
#[command(name = "vodhub", version)]
#[command(about = "Browse, search and health-check CMS10 VOD sites", long_about = None)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding sites.json and config.json
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List sites in display order
    Sites {
        /// Include disabled sites
        #[arg(long)]
        all: bool,
    },
    /// Register a site
    AddSite {
        url: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Change fields of a site
    EditSite {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        ssl_verify: Option<bool>,
        #[arg(long)]
        note: Option<String>,
    },
    RemoveSite { id: i64 },
    /// Move a site one position up or down
    MoveSite {
        id: i64,
        #[arg(value_enum)]
        direction: Direction,
    },
    /// Browse or search one site's catalog
    List {
        url: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        type_id: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
    },
    /// Play sources of one video
    Detail { url: String, id: String },
    /// Search several sites at once (all enabled sites when no --site is given)
    Search {
        keyword: String,
        #[arg(long = "site")]
        sites: Vec<i64>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Probe sites now and record the results
    Check {
        #[arg(long)]
        site: Option<i64>,
        #[arg(long)]
        include_disabled: bool,
    },
    /// Run the periodic health loop until Ctrl-C
    Watch,
    /// Check watch-history entries (JSON array file) for new episodes
    History { file: PathBuf },
    /// Service self-check
    Status,
    /// Read or write a stored config key
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Get { key: String },
    /// Value is parsed as JSON, falling back to a plain string
    Set { key: String, value: String },
}
