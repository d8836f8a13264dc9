use std::collections::HashSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use metadiff::{
    cli::{Cli, Command, DiffArgs, FilterArgs, OutputFormat, WatchArgs},
    AttributeSnapshot, AttributeValue, HasPath, ItemChangeTracker, ItemRecord, MetaDiffConfig, MetadataItem,
    ResultScanner, ResultSetChangeSummary, ResultSetWatcher, ScopedDepthFilter, WatchEvent,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();
    let config = cli.load_config()?;

    match &cli.command {
        Command::Diff(args) => run_diff(args, cli.output),
        Command::Filter(args) => run_filter(args, &config, cli.output),
        Command::Watch(args) => run_watch(args, &config, cli.output),
    }
}

#[derive(Serialize)]
struct KeyChange<'a> {
    key: &'a str,
    previous: Option<&'a AttributeValue>,
    current: Option<&'a AttributeValue>,
}

fn read_snapshot_file(path: &Path) -> Result<AttributeSnapshot> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

fn run_diff(args: &DiffArgs, output: OutputFormat) -> Result<()> {
    let mut tracker = ItemChangeTracker::new();
    tracker.update(read_snapshot_file(&args.previous)?);
    tracker.update(read_snapshot_file(&args.current)?);

    let excluded: HashSet<String> = args.exclude.clone().unwrap_or_default().into_iter().collect();
    let keys = tracker.changed_keys_excluding(&excluded);
    let changes: Vec<KeyChange<'_>> = keys
        .iter()
        .map(|key| KeyChange {
            key,
            previous: tracker.previous().get(key),
            current: tracker.current().get(key),
        })
        .collect();

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
        OutputFormat::Text => {
            if changes.is_empty() {
                println!("No attribute changes");
            }
            for change in &changes {
                println!("{}: {} -> {}", change.key, display_value(change.previous), display_value(change.current));
            }
        }
    }
    Ok(())
}

fn display_value(value: Option<&AttributeValue>) -> String {
    value.map_or_else(|| "(absent)".to_string(), |v| v.to_string())
}

/// A path as the user gave it, matched by its absolute form
struct Candidate {
    given: PathBuf,
    anchored: PathBuf,
}

impl HasPath for Candidate {
    fn path(&self) -> &Path {
        &self.anchored
    }
}

fn run_filter(args: &FilterArgs, config: &MetaDiffConfig, output: OutputFormat) -> Result<()> {
    let candidates: Vec<PathBuf> = if let Some(root) = &args.walk {
        ResultScanner::new(root)?.collect_paths()
    } else if !args.paths.is_empty() {
        args.paths.clone()
    } else {
        let stdin = std::io::stdin();
        let mut paths = Vec::new();
        for line in stdin.lock().lines() {
            let line = line.context("Failed to read paths from stdin")?;
            let line = line.trim();
            if !line.is_empty() {
                paths.push(PathBuf::from(line));
            }
        }
        paths
    };

    // Folders are absolute by now; relative candidates are matched the same way
    let cwd = std::env::current_dir().context("Failed to resolve the current directory")?;
    let candidates: Vec<Candidate> = candidates
        .into_iter()
        .map(|given| Candidate {
            anchored: cwd.join(&given),
            given,
        })
        .collect();

    let filter = ScopedDepthFilter::from_config(&config.filter);
    let scoped: Vec<PathBuf> = filter
        .filter(candidates, &config.filter.folders, config.filter.max_depth)
        .into_iter()
        .map(|candidate| candidate.given)
        .collect();

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&scoped)?),
        OutputFormat::Text => {
            for path in &scoped {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SummaryReport {
    id: String,
    observed_at: String,
    items: usize,
    changed_attributes: Vec<String>,
    changed_items: Vec<ItemChanges>,
}

#[derive(Serialize)]
struct ItemChanges {
    #[serde(flatten)]
    item: ItemRecord,
    changed: Vec<String>,
}

fn summary_report(summary: &ResultSetChangeSummary<MetadataItem>) -> SummaryReport {
    let changed_items = summary
        .items()
        .filter_map(|item| {
            let changed = summary.tracker(&item.id())?.changed_keys();
            (!changed.is_empty()).then(|| ItemChanges {
                item: item.to_record(),
                changed,
            })
        })
        .collect();

    SummaryReport {
        id: summary.id().to_string(),
        observed_at: summary.observed_at().to_rfc3339(),
        items: summary.len(),
        changed_attributes: summary.changed_keys().to_vec(),
        changed_items,
    }
}

fn print_summary(summary: &ResultSetChangeSummary<MetadataItem>, output: OutputFormat) -> Result<()> {
    let report = summary_report(summary);
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
        OutputFormat::Text => {
            println!(
                "[{}] {} items, changed: {}",
                report.observed_at,
                report.items,
                report.changed_attributes.join(", ")
            );
            for entry in &report.changed_items {
                println!("  {} {}", entry.item.path.display(), entry.changed.join(", "));
            }
        }
    }
    Ok(())
}

fn run_watch(args: &WatchArgs, config: &MetaDiffConfig, output: OutputFormat) -> Result<()> {
    let watch_path = args.get_watch_path();
    tracing::info!("Watching result set under: {}", watch_path.display());

    let watcher = ResultSetWatcher::new(&watch_path, config)?;
    let initial = watcher.initial_summary();
    if output == OutputFormat::Text {
        println!("Watching {} items under {}", initial.len(), watch_path.display());
        println!("Press Ctrl+C to quit");
        for item in initial.items() {
            tracing::debug!("tracking {}", item.path().display());
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        match watcher.recv_timeout(Duration::from_millis(100)) {
            Ok(WatchEvent::Refreshed(summary)) => print_summary(&summary, output)?,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
