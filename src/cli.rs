use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::MetaDiffConfig;

#[derive(Parser)]
#[command(name = "metadiff")]
#[command(version)]
#[command(about = "Track attribute changes across file search results and scope them to folders")]
#[command(long_about = "metadiff compares attribute snapshots of search results, reports which attributes changed per item and across the whole result set, and restricts results to a bounded depth below a set of root folders.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare two attribute snapshots of one item
    Diff(DiffArgs),
    /// Keep the paths that lie within a depth of some root folders
    Filter(FilterArgs),
    /// Watch a directory as a live result set and report changes
    Watch(WatchArgs),
}

#[derive(Args)]
pub struct DiffArgs {
    /// Snapshot observed first (JSON object of attribute key to value)
    #[arg(long, value_name = "FILE")]
    pub previous: PathBuf,

    /// Snapshot observed last
    #[arg(long, value_name = "FILE")]
    pub current: PathBuf,

    /// Attribute keys to leave out of the report
    #[arg(long, value_delimiter = ',', help = "Attribute keys to exclude")]
    pub exclude: Option<Vec<String>>,
}

#[derive(Args, Default)]
pub struct ScopeArgs {
    /// Root folder; may be repeated
    #[arg(long = "folder", value_name = "DIR", help = "Root folder results must live under")]
    pub folders: Vec<PathBuf>,

    /// Maximum depth below a root folder, negative disables scoping
    #[arg(long, allow_negative_numbers = true, help = "Maximum depth below a root folder")]
    pub max_depth: Option<isize>,
}

#[derive(Args)]
pub struct FilterArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Walk this directory for candidate paths instead of reading them
    #[arg(long, value_name = "ROOT", conflicts_with = "paths")]
    pub walk: Option<PathBuf>,

    /// Candidate paths; read from stdin, one per line, when omitted
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Directory to watch
    #[arg(value_name = "ROOT", help = "Directory to watch (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[command(flatten)]
    pub scope: ScopeArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text (default)
    Text,
    /// JSON output for scripting
    Json,
}

impl Cli {
    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    /// Load the configuration file (if any) and fold in command line scope
    /// options, which take precedence. Relative folders are taken from the
    /// current directory.
    pub fn load_config(&self) -> anyhow::Result<MetaDiffConfig> {
        let mut config = MetaDiffConfig::load(self.config.as_deref())?;

        let scope = match &self.command {
            Command::Filter(args) => Some(&args.scope),
            Command::Watch(args) => Some(&args.scope),
            Command::Diff(_) => None,
        };
        if let Some(scope) = scope {
            scope.apply_to(&mut config);
        }
        let cwd = std::env::current_dir().context("Failed to resolve the current directory")?;
        config.filter.anchor_folders(&cwd);

        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Diff(args) => {
                for path in [&args.previous, &args.current] {
                    if !path.is_file() {
                        return Err(format!("Snapshot file does not exist: {}", path.display()));
                    }
                }
            }
            Command::Filter(args) => {
                if let Some(root) = &args.walk {
                    if !root.is_dir() {
                        return Err(format!("Path is not a directory: {}", root.display()));
                    }
                }
            }
            Command::Watch(args) => {
                let path = args.get_watch_path();
                if !path.exists() {
                    return Err(format!("Path does not exist: {}", path.display()));
                }
                if !path.is_dir() {
                    return Err(format!("Path is not a directory: {}", path.display()));
                }
            }
        }
        Ok(())
    }
}

impl ScopeArgs {
    pub fn apply_to(&self, config: &mut MetaDiffConfig) {
        if !self.folders.is_empty() {
            config.filter.folders = self.folders.clone();
        }
        if let Some(depth) = self.max_depth {
            config.filter.max_depth = depth;
        }
    }
}

impl WatchArgs {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }
}
