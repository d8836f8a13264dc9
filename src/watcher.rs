use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::MetaDiffConfig;
use crate::core::{AttributeSnapshot, HasPath, MetadataItem, ResultSetChangeSummary, ScopedDepthFilter, TrackedItem};
use crate::scan::{read_items, read_snapshot, removed_snapshot, ResultScanner};

/// A batch is flushed at the latest after this many debounce periods, even
/// while events keep arriving.
const MAX_BATCH_PERIODS: u32 = 10;

#[derive(Debug)]
pub enum WatchEvent {
    /// A new summary after one batch of file-system events
    Refreshed(ResultSetChangeSummary<MetadataItem>),
}

/// Keeps a scanned result set up to date and publishes a change summary
/// each time part of it changes.
pub struct ResultSetWatcher {
    _watcher: RecommendedWatcher,
    event_rx: Receiver<WatchEvent>,
    initial: ResultSetChangeSummary<MetadataItem>,
}

/// Paths with pending events, re-read once events on them have settled
#[derive(Debug, Default)]
struct PendingPaths {
    paths: BTreeSet<PathBuf>,
    first_seen: Option<Instant>,
    last_seen: Option<Instant>,
}

struct ResultSet {
    scanner: ResultScanner,
    filter: ScopedDepthFilter,
    config: MetaDiffConfig,
    items: Vec<MetadataItem>,
    by_path: HashMap<PathBuf, usize>,
    next_id: u64,
    /// Latest snapshot per item index since the last refresh
    staged: HashMap<usize, AttributeSnapshot>,
    /// Items whose file is gone; dropped once a refresh has reported them
    removed: HashSet<usize>,
}

impl ResultSetWatcher {
    pub fn new<P: AsRef<Path>>(path: P, config: &MetaDiffConfig) -> Result<Self> {
        let mut results = ResultSet::open(path.as_ref(), config.clone())?;
        let root = results.scanner.root().to_path_buf();
        let initial = ResultSetChangeSummary::new(&results.items);
        tracing::info!(items = results.items.len(), root = %root.display(), "initial result set scanned");

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = mpsc::channel::<WatchEvent>();

        let mut watcher = notify::recommended_watcher(tx)
            .context("Failed to create file system watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .context("Failed to start watching directory")?;

        let debounce = config.watcher.event_debounce_duration();
        thread::spawn(move || {
            let mut pending = PendingPaths::default();

            loop {
                let received = if pending.is_empty() {
                    rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                } else {
                    rx.recv_timeout(pending.time_left(Instant::now(), debounce))
                };

                match received {
                    Ok(Ok(event)) => {
                        if !is_content_event(&event.kind) {
                            continue;
                        }
                        let now = Instant::now();
                        for path in event.paths {
                            if results.scanner.is_result_path(&path) {
                                pending.record(path, now);
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        tracing::error!("File watcher error: {}", err);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if !pending.is_due(Instant::now(), debounce) {
                    continue;
                }
                for path in pending.take() {
                    results.apply(&path);
                }
                if let Some(summary) = results.refresh() {
                    if event_tx.send(WatchEvent::Refreshed(summary)).is_err() {
                        break; // Receiver dropped, exit thread
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            event_rx,
            initial,
        })
    }

    /// Summary of the result set as first scanned
    pub fn initial_summary(&self) -> &ResultSetChangeSummary<MetadataItem> {
        &self.initial
    }

    pub fn try_recv(&self) -> Result<WatchEvent, mpsc::TryRecvError> {
        self.event_rx.try_recv()
    }

    pub fn recv(&self) -> Result<WatchEvent, mpsc::RecvError> {
        self.event_rx.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, mpsc::RecvTimeoutError> {
        self.event_rx.recv_timeout(timeout)
    }
}

fn is_content_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

impl PendingPaths {
    fn record(&mut self, path: PathBuf, now: Instant) {
        self.paths.insert(path);
        self.first_seen.get_or_insert(now);
        self.last_seen = Some(now);
    }

    fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Quiet for a whole debounce period, or open for too long
    fn is_due(&self, now: Instant, debounce: Duration) -> bool {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => {
                now.duration_since(last) >= debounce || now.duration_since(first) >= debounce * MAX_BATCH_PERIODS
            }
            _ => false,
        }
    }

    fn time_left(&self, now: Instant, debounce: Duration) -> Duration {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => {
                let quiet = debounce.saturating_sub(now.duration_since(last));
                let cap = (debounce * MAX_BATCH_PERIODS).saturating_sub(now.duration_since(first));
                quiet.min(cap)
            }
            _ => debounce,
        }
    }

    fn take(&mut self) -> BTreeSet<PathBuf> {
        self.first_seen = None;
        self.last_seen = None;
        std::mem::take(&mut self.paths)
    }
}

impl ResultSet {
    /// Scan `root` with folders resolved the way the scanned paths are
    fn open(root: &Path, mut config: MetaDiffConfig) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;
        config.filter.canonicalize_folders();
        for folder in &config.filter.folders {
            if !folder.starts_with(&root) && !root.starts_with(folder) {
                tracing::warn!(folder = %folder.display(), root = %root.display(), "scope folder lies outside the watched root");
            }
        }
        Ok(Self::scan(ResultScanner::new(&root)?, config))
    }

    fn scan(scanner: ResultScanner, config: MetaDiffConfig) -> Self {
        let filter = ScopedDepthFilter::from_config(&config.filter);
        let paths = filter.filter(scanner.collect_paths(), &config.filter.folders, config.filter.max_depth);
        let items = read_items(paths, config.watcher.max_items);
        let by_path = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.path().to_path_buf(), idx))
            .collect();
        let next_id = items.iter().map(|item| item.id() + 1).max().unwrap_or(0);

        Self {
            scanner,
            filter,
            config,
            items,
            by_path,
            next_id,
            staged: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    fn in_scope(&self, path: &Path) -> bool {
        let scope = &self.config.filter;
        !self.filter.filter(vec![path], &scope.folders, scope.max_depth).is_empty()
    }

    /// Re-read one path and stage its snapshot for the next refresh;
    /// returns whether the result set is affected
    fn apply(&mut self, path: &Path) -> bool {
        let read = read_snapshot(path);
        let known = self.by_path.get(path).copied();

        let idx = match (known, &read) {
            (Some(idx), _) => idx,
            // Gone before we got to it
            (None, Err(_)) => return false,
            (None, Ok(_)) => {
                if !self.in_scope(path) {
                    return false;
                }
                if self.items.len() >= self.config.watcher.max_items {
                    tracing::warn!(path = %path.display(), "result set full, ignoring new item");
                    return false;
                }
                let idx = self.items.len();
                self.items.push(MetadataItem::new(self.next_id, path));
                self.next_id += 1;
                self.by_path.insert(path.to_path_buf(), idx);
                idx
            }
        };

        let snapshot = match read {
            Ok(snapshot) => {
                self.removed.remove(&idx);
                snapshot
            }
            Err(_) => {
                self.removed.insert(idx);
                removed_snapshot(path)
            }
        };
        self.staged.insert(idx, snapshot);
        true
    }

    /// Start a new epoch for every item and summarize it. Items without a
    /// staged snapshot keep their current one, so they report no changes.
    /// Items reported as removed leave the result set afterwards.
    fn refresh(&mut self) -> Option<ResultSetChangeSummary<MetadataItem>> {
        if self.staged.is_empty() {
            return None;
        }

        for (idx, item) in self.items.iter_mut().enumerate() {
            let snapshot = self
                .staged
                .remove(&idx)
                .unwrap_or_else(|| item.tracker().current().clone());
            item.update(snapshot);
        }
        let summary = ResultSetChangeSummary::new(&self.items);

        if !self.removed.is_empty() {
            let removed = std::mem::take(&mut self.removed);
            let mut idx = 0;
            self.items.retain(|_| {
                let keep = !removed.contains(&idx);
                idx += 1;
                keep
            });
            self.by_path = self
                .items
                .iter()
                .enumerate()
                .map(|(idx, item)| (item.path().to_path_buf(), idx))
                .collect();
            tracing::debug!(removed = removed.len(), items = self.items.len(), "removed items dropped");
        }

        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MetadataAttribute;
    use std::fs;
    use tempfile::TempDir;

    fn result_set(root: &Path) -> ResultSet {
        ResultSet::open(root, MetaDiffConfig::default()).expect("Failed to open result set")
    }

    fn changed_names(summary: &ResultSetChangeSummary<MetadataItem>, attribute: &MetadataAttribute) -> Vec<String> {
        summary
            .changed_items(attribute)
            .into_iter()
            .map(|item| item.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_modified_item_reports_changes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.txt"), "one").expect("Failed to write file");
        let mut results = result_set(temp_dir.path());
        let path = results.items[0].path().to_path_buf();

        fs::write(&path, "one two three").expect("Failed to modify file");
        assert!(results.apply(&path));

        let summary = results.refresh().expect("Expected a summary");
        assert!(summary.did_change(&MetadataAttribute::FileSize));
        assert!(!summary.did_change(&MetadataAttribute::FileName));
    }

    #[test]
    fn test_untouched_items_do_not_repeat_changes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write file");
        fs::write(temp_dir.path().join("b.txt"), "b").expect("Failed to write file");
        let mut results = result_set(temp_dir.path());
        let root = results.scanner.root().to_path_buf();

        fs::write(root.join("a.txt"), "a grown").expect("Failed to modify file");
        assert!(results.apply(&root.join("a.txt")));
        let first = results.refresh().expect("Expected a summary");
        assert_eq!(changed_names(&first, &MetadataAttribute::FileSize), vec!["a.txt"]);

        fs::write(root.join("b.txt"), "b grown").expect("Failed to modify file");
        assert!(results.apply(&root.join("b.txt")));
        let second = results.refresh().expect("Expected a summary");
        assert_eq!(changed_names(&second, &MetadataAttribute::FileSize), vec!["b.txt"]);

        // The earlier summary is unaffected by the later refresh
        assert_eq!(changed_names(&first, &MetadataAttribute::FileSize), vec!["a.txt"]);
    }

    #[test]
    fn test_refresh_without_staged_changes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.txt"), "a").expect("Failed to write file");
        let mut results = result_set(temp_dir.path());

        assert!(results.refresh().is_none());
    }

    #[test]
    fn test_new_item_joins_result_set() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut results = result_set(temp_dir.path());
        assert!(results.items.is_empty());

        let path = results.scanner.root().join("new.txt");
        fs::write(&path, "x").expect("Failed to write file");
        assert!(results.apply(&path));

        let summary = results.refresh().expect("Expected a summary");
        assert_eq!(summary.len(), 1);
        assert!(summary.did_change(&MetadataAttribute::FileName));
    }

    #[test]
    fn test_removed_item_loses_attributes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("gone.txt"), "bye").expect("Failed to write file");
        fs::write(temp_dir.path().join("stays.txt"), "hi").expect("Failed to write file");
        let mut results = result_set(temp_dir.path());
        let root = results.scanner.root().to_path_buf();

        fs::remove_file(root.join("gone.txt")).expect("Failed to remove file");
        assert!(results.apply(&root.join("gone.txt")));

        let summary = results.refresh().expect("Expected a summary");
        assert_eq!(summary.len(), 2);
        assert_eq!(changed_names(&summary, &MetadataAttribute::FileSize), vec!["gone.txt"]);
        assert!(!summary.did_change(&MetadataAttribute::Path));

        // Reported once, then gone from the result set
        fs::write(root.join("stays.txt"), "hello").expect("Failed to modify file");
        assert!(results.apply(&root.join("stays.txt")));
        let next = results.refresh().expect("Expected a summary");
        assert_eq!(next.len(), 1);
        assert_eq!(changed_names(&next, &MetadataAttribute::FileSize), vec!["stays.txt"]);
        assert!(!results.by_path.contains_key(&root.join("gone.txt")));
        assert_eq!(results.by_path.get(&root.join("stays.txt")), Some(&0));
    }

    #[test]
    fn test_out_of_scope_item_is_ignored() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().canonicalize().unwrap();
        let mut config = MetaDiffConfig::default();
        config.filter.folders = vec![root.join("docs")];
        config.filter.max_depth = 0;
        let mut results = ResultSet::open(&root, config).expect("Failed to open result set");

        let path = root.join("other.txt");
        fs::write(&path, "x").expect("Failed to write file");
        assert!(!results.apply(&path));
        assert!(results.items.is_empty());
    }

    #[test]
    fn test_item_limit_counts_scoped_items_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().canonicalize().unwrap();
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            fs::write(root.join(name), name).expect("Failed to write file");
        }
        fs::create_dir(root.join("zdocs")).expect("Failed to create dir");
        fs::write(root.join("zdocs/keep.txt"), "keep").expect("Failed to write file");

        let mut config = MetaDiffConfig::default();
        config.filter.folders = vec![root.join("zdocs")];
        config.filter.max_depth = 1;
        config.watcher.max_items = 3;
        let results = ResultSet::open(&root, config).expect("Failed to open result set");

        let mut paths: Vec<PathBuf> = results.items.iter().map(|item| item.path().to_path_buf()).collect();
        paths.sort();
        assert_eq!(paths, vec![root.join("zdocs"), root.join("zdocs/keep.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_folders_through_symlink_match_scanned_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("data");
        fs::create_dir_all(root.join("docs")).expect("Failed to create dirs");
        fs::write(root.join("docs/a.txt"), "a").expect("Failed to write file");
        fs::write(root.join("b.txt"), "b").expect("Failed to write file");
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&root, &link).expect("Failed to create symlink");

        let mut config = MetaDiffConfig::default();
        config.filter.folders = vec![link.join("docs")];
        config.filter.max_depth = 1;
        let results = ResultSet::open(&link, config).expect("Failed to open result set");

        let names: Vec<String> = results
            .items
            .iter()
            .map(|item| item.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"docs".to_string()));
        assert!(names.contains(&"a.txt".to_string()));
    }

    #[test]
    fn test_rapid_writes_are_read_once_settled() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.txt"), "one").expect("Failed to write file");
        let mut results = result_set(temp_dir.path());
        let path = results.items[0].path().to_path_buf();
        let debounce = Duration::from_millis(100);
        let start = Instant::now();
        let mut pending = PendingPaths::default();

        fs::write(&path, "two!").expect("Failed to modify file");
        pending.record(path.clone(), start);
        assert!(!pending.is_due(start + Duration::from_millis(50), debounce));

        fs::write(&path, "three!!").expect("Failed to modify file");
        pending.record(path.clone(), start + Duration::from_millis(50));
        assert!(!pending.is_due(start + Duration::from_millis(120), debounce));
        assert_eq!(pending.time_left(start + Duration::from_millis(120), debounce), Duration::from_millis(30));
        assert!(pending.is_due(start + Duration::from_millis(150), debounce));

        let settled = pending.take();
        assert_eq!(settled.len(), 1);
        assert!(pending.is_empty());
        for path in &settled {
            results.apply(path);
        }

        let summary = results.refresh().expect("Expected a summary");
        let size = summary.changed_values::<i64, _>(&MetadataAttribute::FileSize);
        assert_eq!(size.len(), 1);
        assert_eq!((size[0].previous, size[0].value), (3, 7));
    }

    #[test]
    fn test_busy_batch_is_flushed_eventually() {
        let debounce = Duration::from_millis(100);
        let start = Instant::now();
        let mut pending = PendingPaths::default();

        for step in 0..20u64 {
            pending.record(PathBuf::from(format!("/r/{}", step % 3)), start + Duration::from_millis(step * 60));
        }
        // Never quiet for a full period, but open longer than the cap
        assert!(pending.is_due(start + Duration::from_millis(1_150), debounce));
        assert_eq!(pending.take().len(), 3);
        assert!(!pending.is_due(start + Duration::from_millis(5_000), debounce));
    }
}
