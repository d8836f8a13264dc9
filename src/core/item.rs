use std::hash::Hash;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::attribute::Attribute;
use super::snapshot::AttributeSnapshot;
use super::tracker::ItemChangeTracker;
use super::value::{AttributeValue, FromAttributeValue};

/// A result item located on disk
pub trait HasPath {
    fn path(&self) -> &Path;
}

impl HasPath for PathBuf {
    fn path(&self) -> &Path {
        self
    }
}

impl HasPath for &Path {
    fn path(&self) -> &Path {
        self
    }
}

/// A result item that carries a change tracker
pub trait TrackedItem {
    type Id: Clone + Eq + Hash;

    fn item_id(&self) -> Self::Id;
    fn tracker(&self) -> &ItemChangeTracker;
}

/// One search result: a file path and the attribute snapshots seen for it
#[derive(Debug, Clone)]
pub struct MetadataItem {
    id: u64,
    path: PathBuf,
    tracker: ItemChangeTracker,
}

impl MetadataItem {
    pub fn new(id: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            tracker: ItemChangeTracker::new(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: AttributeSnapshot) -> Self {
        self.update(snapshot);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn update(&mut self, snapshot: AttributeSnapshot) {
        self.tracker.update(snapshot);
    }

    pub fn value<A: Attribute>(&self, attribute: &A) -> Option<&AttributeValue> {
        self.tracker.current().get(attribute.key())
    }

    pub fn value_as<T: FromAttributeValue, A: Attribute>(&self, attribute: &A) -> Option<T> {
        self.value(attribute)?.get::<T>()
    }

    pub fn to_record(&self) -> ItemRecord {
        ItemRecord {
            id: self.id,
            path: self.path.clone(),
        }
    }
}

impl HasPath for MetadataItem {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackedItem for MetadataItem {
    type Id = u64;

    fn item_id(&self) -> u64 {
        self.id
    }

    fn tracker(&self) -> &ItemChangeTracker {
        &self.tracker
    }
}

/// Serializable reference to an item, used in CLI output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    pub id: u64,
    pub path: PathBuf,
}
