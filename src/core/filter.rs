//! Folder scope filtering
//!
//! Keeps the result items that sit at most `max_depth` levels below one of a
//! set of root folders. Items are checked in parallel; the output keeps the
//! input order.

use std::path::{Component, Path};
use std::thread;
use std::time::Instant;

use super::item::HasPath;
use crate::config::FilterConfig;

/// A root folder broken into standardized components
#[derive(Debug, Clone)]
pub struct PathSpec<'a> {
    path: &'a Path,
    components: Vec<Component<'a>>,
}

impl<'a> PathSpec<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self {
            path,
            components: standardized_components(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    pub fn components(&self) -> &[Component<'a>] {
        &self.components
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// How far below this folder `components` lie, if they are inside it
    pub fn depth_of(&self, components: &[Component<'_>]) -> Option<usize> {
        components
            .starts_with(&self.components)
            .then(|| components.len() - self.components.len())
    }
}

/// Lexically resolve `.` and `..` without touching the file system.
pub fn standardized_components(path: &Path) -> Vec<Component<'_>> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            other => components.push(other),
        }
    }
    components
}

/// Depth-bounded, order-preserving filter over result items
#[derive(Debug, Clone)]
pub struct ScopedDepthFilter {
    workers: usize,
    parallel_threshold: usize,
}

impl ScopedDepthFilter {
    pub fn new() -> Self {
        Self::from_config(&FilterConfig::default())
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            workers: config.workers,
            parallel_threshold: config.parallel_threshold,
        }
    }

    /// Keep the items that live at most `max_depth` levels below one of
    /// `folders`. With no folders or a negative depth, `items` is returned
    /// as is.
    pub fn filter<I, P>(&self, items: Vec<I>, folders: &[P], max_depth: isize) -> Vec<I>
    where
        I: HasPath,
        P: AsRef<Path>,
    {
        if folders.is_empty() || max_depth < 0 {
            return items;
        }
        let max_depth = max_depth as usize;
        let started = Instant::now();

        let matched = {
            let mut specs: Vec<PathSpec<'_>> = folders.iter().map(|f| PathSpec::new(f.as_ref())).collect();
            // Stable, so folders of equal depth keep their given order
            specs.sort_by(|a, b| b.component_count().cmp(&a.component_count()));
            let scope = Scope {
                strict_max_components: specs[0].component_count() + max_depth,
                specs,
                max_depth,
            };

            let paths: Vec<&Path> = items.iter().map(HasPath::path).collect();
            self.matching_indices(&paths, &scope)
        };

        let total = items.len();
        let mut keep = matched.into_iter().peekable();
        let filtered: Vec<I> = items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| {
                if keep.peek() == Some(&idx) {
                    keep.next();
                    Some(item)
                } else {
                    None
                }
            })
            .collect();

        tracing::debug!(
            items = total,
            folders = folders.len(),
            max_depth,
            matched = filtered.len(),
            elapsed = ?started.elapsed(),
            "scoped depth filter finished"
        );
        filtered
    }

    fn matching_indices(&self, paths: &[&Path], scope: &Scope<'_>) -> Vec<usize> {
        let workers = self.worker_count(paths.len());
        if workers <= 1 {
            return paths
                .iter()
                .enumerate()
                .filter(|(_, path)| scope.contains(path))
                .map(|(idx, _)| idx)
                .collect();
        }

        let chunk_size = (paths.len() + workers - 1) / workers;
        let mut matched: Vec<usize> = thread::scope(|s| {
            let handles: Vec<_> = paths
                .chunks(chunk_size)
                .enumerate()
                .map(|(chunk_idx, chunk)| {
                    s.spawn(move || {
                        let offset = chunk_idx * chunk_size;
                        chunk
                            .iter()
                            .enumerate()
                            .filter(|(_, path)| scope.contains(path))
                            .map(|(idx, _)| offset + idx)
                            .collect::<Vec<usize>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        // Workers finish in any order; the index tag restores input order.
        matched.sort_unstable();
        matched
    }

    fn worker_count(&self, items: usize) -> usize {
        if items < self.parallel_threshold.max(2) {
            return 1;
        }
        let workers = if self.workers == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            self.workers
        };
        workers.min(items)
    }
}

impl Default for ScopedDepthFilter {
    fn default() -> Self {
        Self::new()
    }
}

struct Scope<'a> {
    /// Deepest folders first
    specs: Vec<PathSpec<'a>>,
    max_depth: usize,
    strict_max_components: usize,
}

impl Scope<'_> {
    fn contains(&self, path: &Path) -> bool {
        let components = standardized_components(path);
        if components.len() > self.strict_max_components {
            return false;
        }

        // The first folder that prefixes the path decides.
        self.specs
            .iter()
            .find_map(|spec| spec.depth_of(&components))
            .map_or(false, |depth| depth <= self.max_depth)
    }
}

/// Filter with the default worker settings
pub fn filter_by_depth<I, P>(items: Vec<I>, folders: &[P], max_depth: isize) -> Vec<I>
where
    I: HasPath,
    P: AsRef<Path>,
{
    ScopedDepthFilter::new().filter(items, folders, max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_standardized_components() {
        let components = standardized_components(Path::new("/root/./a/../b/c"));
        assert_eq!(components, standardized_components(Path::new("/root/b/c")));

        let above_root = standardized_components(Path::new("/../x"));
        assert_eq!(above_root, standardized_components(Path::new("/x")));

        let relative = standardized_components(Path::new("../x"));
        assert_eq!(relative, vec![Component::ParentDir, Component::Normal("x".as_ref())]);
    }

    #[test]
    fn test_depth_filter_soundness() {
        let items = paths(&["/root/a/x.txt", "/root/a/x/y.txt", "/root/b/c/z.txt", "/root/other/q.txt"]);
        let folders = paths(&["/root/a", "/root/b/c"]);

        let result = filter_by_depth(items, &folders, 1);
        assert_eq!(result, paths(&["/root/a/x.txt", "/root/b/c/z.txt"]));
    }

    #[test]
    fn test_no_folders_or_negative_depth_pass_through() {
        let items = paths(&["/b/2", "/a/1", "/c/3/4/5"]);
        let no_folders: [PathBuf; 0] = [];

        assert_eq!(filter_by_depth(items.clone(), &no_folders, 3), items);
        assert_eq!(filter_by_depth(items.clone(), &paths(&["/a"]), -1), items);
    }

    #[test]
    fn test_zero_depth_keeps_folder_itself_only() {
        let items = paths(&["/a", "/a/b", "/a/b/c"]);
        let result = filter_by_depth(items, &paths(&["/a"]), 0);
        assert_eq!(result, paths(&["/a"]));
    }

    #[test]
    fn test_deepest_matching_folder_decides() {
        // `/a/b/c/d` is 3 below `/a` but 1 below `/a/b/c`, which is checked first
        let items = paths(&["/a/b/c/d", "/a/x"]);
        let folders = paths(&["/a", "/a/b/c"]);

        let result = filter_by_depth(items, &folders, 1);
        assert_eq!(result, paths(&["/a/b/c/d", "/a/x"]));
    }

    #[test]
    fn test_too_deep_for_every_folder() {
        let items = paths(&["/a/b/x/y/z", "/a/b/x"]);
        let folders = paths(&["/a", "/a/b"]);

        assert_eq!(filter_by_depth(items, &folders, 2), paths(&["/a/b/x"]));
    }

    #[test]
    fn test_unnormalized_inputs() {
        let items = paths(&["/root/a/./x.txt", "/root/b/../a/y.txt"]);
        let folders = paths(&["/root/./a/"]);

        let result = filter_by_depth(items.clone(), &folders, 1);
        assert_eq!(result, items);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let items: Vec<PathBuf> = (0..500)
            .map(|i| PathBuf::from(format!("/data/{}/{}/file{}.txt", i % 3, i % 5, i)))
            .collect();
        let folders = paths(&["/data/0", "/data/1/2"]);

        let sequential = ScopedDepthFilter::from_config(&FilterConfig {
            workers: 1,
            ..FilterConfig::default()
        })
        .filter(items.clone(), &folders, 2);

        let parallel = ScopedDepthFilter::from_config(&FilterConfig {
            workers: 8,
            parallel_threshold: 2,
            ..FilterConfig::default()
        });

        for _ in 0..10 {
            assert_eq!(parallel.filter(items.clone(), &folders, 2), sequential);
        }
        assert!(!sequential.is_empty());
    }
}
