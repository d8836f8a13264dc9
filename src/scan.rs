//! Building result items from the file system
//!
//! The core works on snapshots handed to it. This module produces those
//! snapshots for plain directories: it walks a root (respecting ignore
//! files) and reads file metadata into [`AttributeSnapshot`]s.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;

use crate::core::{AttributeSnapshot, MetadataAttribute, MetadataItem};

pub struct ResultScanner {
    root_path: PathBuf,
}

impl ResultScanner {
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        if !root_path.is_dir() {
            anyhow::bail!("Not a directory: {}", root_path.display());
        }
        Ok(Self { root_path })
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    fn walker(&self) -> WalkBuilder {
        let mut builder = WalkBuilder::new(&self.root_path);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .filter_entry(|entry| entry.file_name() != ".git");
        builder
    }

    /// Every path under the root that is not ignored, in walk order
    pub fn collect_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        for result in self.walker().build() {
            match result {
                Ok(entry) => {
                    if entry.depth() > 0 {
                        paths.push(entry.into_path());
                    }
                }
                Err(err) => {
                    tracing::warn!("Error walking directory: {}", err);
                }
            }
        }

        paths
    }

    /// Whether a path would be part of the result set
    pub fn is_result_path<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();

        if path.components().any(|comp| comp.as_os_str() == ".git") {
            return false;
        }
        path.starts_with(&self.root_path) && path != self.root_path
    }

    /// Scan the root into items with ids assigned in walk order
    pub fn scan_items(&self, limit: usize) -> Vec<MetadataItem> {
        read_items(self.collect_paths(), limit)
    }
}

/// Read up to `limit` of `paths` into items, ids in the order given.
/// Callers scope the paths first so that out-of-scope entries never count
/// towards the limit.
pub fn read_items(paths: Vec<PathBuf>, limit: usize) -> Vec<MetadataItem> {
    if paths.len() > limit {
        tracing::warn!(found = paths.len(), limit, "result set truncated");
    }

    paths
        .into_iter()
        .take(limit)
        .enumerate()
        .filter_map(|(id, path)| match read_snapshot(&path) {
            Ok(snapshot) => Some(MetadataItem::new(id as u64, path).with_snapshot(snapshot)),
            Err(err) => {
                tracing::warn!("Skipping {}: {:#}", path.display(), err);
                None
            }
        })
        .collect()
}

/// Read the metadata of `path` into a snapshot
pub fn read_snapshot(path: &Path) -> Result<AttributeSnapshot> {
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;
    Ok(snapshot_from_metadata(path, &metadata))
}

/// A deleted item keeps only its path
pub fn removed_snapshot(path: &Path) -> AttributeSnapshot {
    AttributeSnapshot::new().with(&MetadataAttribute::Path, path.to_string_lossy().into_owned())
}

pub fn snapshot_from_metadata(path: &Path, metadata: &Metadata) -> AttributeSnapshot {
    let mut snapshot = removed_snapshot(path)
        .with(&MetadataAttribute::FileSize, metadata.len())
        .with(&MetadataAttribute::IsDirectory, metadata.is_dir())
        .with(&MetadataAttribute::IsReadOnly, metadata.permissions().readonly());

    if let Some(name) = path.file_name() {
        let name = name.to_string_lossy();
        snapshot.insert(MetadataAttribute::FileName.as_key(), &*name);
        snapshot.insert(MetadataAttribute::IsHidden.as_key(), name.starts_with('.'));
    }
    if let Some(ext) = path.extension() {
        snapshot.insert(MetadataAttribute::FileExtension.as_key(), ext.to_string_lossy().into_owned());
    }
    if let Ok(modified) = metadata.modified() {
        snapshot.insert(MetadataAttribute::ModificationDate.as_key(), to_date(modified));
    }
    if let Ok(created) = metadata.created() {
        snapshot.insert(MetadataAttribute::CreationDate.as_key(), to_date(created));
    }
    if let Ok(accessed) = metadata.accessed() {
        snapshot.insert(MetadataAttribute::LastUsedDate.as_key(), to_date(accessed));
    }

    snapshot
}

fn to_date(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}
