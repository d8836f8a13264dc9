//! Per-item attribute change tracking
//!
//! An [`ItemChangeTracker`] keeps the two most recent snapshots of an item
//! and answers "did this attribute change?" lazily. Nothing is compared
//! until asked, and each key is compared at most once between two calls to
//! [`ItemChangeTracker::update`].
//!
//! Per key and per epoch the state machine is:
//!
//! ```text
//! pending --compare--> changed   (memoized, reported)
//!         \-compare--> unchanged (dropped from pending, never re-compared)
//! ```
//!
//! The memo lives behind a `RefCell`, so queries take `&self` but a tracker
//! cannot be shared between threads without external synchronization.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::attribute::Attribute;
use super::snapshot::AttributeSnapshot;
use super::value::{AttributeValue, Comparison, FromAttributeValue};

/// Decides whether two present values are equal
pub trait ValueComparator: Send + Sync {
    fn compare(&self, key: &str, current: &AttributeValue, previous: &AttributeValue) -> Comparison;
}

/// Uses [`AttributeValue::compare`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardComparator;

impl ValueComparator for StandardComparator {
    fn compare(&self, _key: &str, current: &AttributeValue, previous: &AttributeValue) -> Comparison {
        current.compare(previous)
    }
}

/// Both sides of a changed attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange<T> {
    pub value: T,
    pub previous: T,
}

#[derive(Debug, Clone, Default)]
struct DiffState {
    resolved_changed: BTreeSet<String>,
    /// `None` until first needed in the current epoch
    pending: Option<BTreeSet<String>>,
}

#[derive(Clone)]
pub struct ItemChangeTracker {
    current: AttributeSnapshot,
    previous: AttributeSnapshot,
    state: RefCell<DiffState>,
    comparator: Arc<dyn ValueComparator>,
}

impl ItemChangeTracker {
    pub fn new() -> Self {
        Self::with_comparator(Arc::new(StandardComparator))
    }

    pub fn with_comparator(comparator: Arc<dyn ValueComparator>) -> Self {
        Self {
            current: AttributeSnapshot::default(),
            previous: AttributeSnapshot::default(),
            state: RefCell::new(DiffState::default()),
            comparator,
        }
    }

    /// Start a new epoch: the current snapshot becomes the previous one.
    pub fn update(&mut self, new_values: AttributeSnapshot) {
        self.previous = std::mem::replace(&mut self.current, new_values);
        *self.state.get_mut() = DiffState::default();
    }

    pub fn current(&self) -> &AttributeSnapshot {
        &self.current
    }

    pub fn previous(&self) -> &AttributeSnapshot {
        &self.previous
    }

    pub fn has_changed<A: Attribute>(&self, attribute: &A) -> bool {
        self.has_changed_key(attribute.key())
    }

    pub fn has_changed_key(&self, key: &str) -> bool {
        let mut state = self.state.borrow_mut();
        if state.resolved_changed.contains(key) {
            return true;
        }

        let pending = state
            .pending
            .get_or_insert_with(|| self.current.key_union(&self.previous));
        // Keys outside the pending set were either compared already or are
        // absent from both snapshots.
        if !pending.remove(key) {
            return false;
        }

        let changed = self.resolve(key);
        if changed {
            state.resolved_changed.insert(key.to_string());
        }
        changed
    }

    fn resolve(&self, key: &str) -> bool {
        match (self.current.get(key), self.previous.get(key)) {
            (None, None) => false,
            (Some(_), None) | (None, Some(_)) => true,
            (Some(current), Some(previous)) => match self.comparator.compare(key, current, previous) {
                Comparison::Equal => false,
                Comparison::Unequal => true,
                Comparison::Incomparable => {
                    tracing::debug!(
                        key,
                        current = current.kind(),
                        previous = previous.kind(),
                        "incomparable attribute values, reporting as changed"
                    );
                    true
                }
            },
        }
    }

    /// Keys that differ between the two snapshots, sorted
    pub fn changed_keys(&self) -> Vec<String> {
        self.changed_keys_excluding(&HashSet::new())
    }

    /// Like [`changed_keys`](Self::changed_keys), but never compares or
    /// reports the excluded keys. Excluded keys stay pending, so a later
    /// direct query for one of them is still answered correctly.
    pub fn changed_keys_excluding(&self, excluded: &HashSet<String>) -> Vec<String> {
        let to_evaluate: Vec<String> = {
            let mut state = self.state.borrow_mut();
            let pending = state
                .pending
                .get_or_insert_with(|| self.current.key_union(&self.previous));
            pending
                .iter()
                .filter(|key| !excluded.contains(*key))
                .cloned()
                .collect()
        };

        for key in &to_evaluate {
            self.has_changed_key(key);
        }

        self.state
            .borrow()
            .resolved_changed
            .iter()
            .filter(|key| !excluded.contains(*key))
            .cloned()
            .collect()
    }

    /// Changed attributes decoded through the catalog `A`. Keys the catalog
    /// does not know are dropped.
    pub fn changed_attributes<A: Attribute>(&self) -> Vec<A> {
        decode_keys(self.changed_keys())
    }

    pub fn changed_attributes_excluding<A: Attribute>(&self, excluding: &[A]) -> Vec<A> {
        let excluded: HashSet<String> = excluding.iter().map(|a| a.key().to_string()).collect();
        decode_keys(self.changed_keys_excluding(&excluded))
    }

    /// Both sides of a changed attribute, when both are present as `T`
    pub fn change<T: FromAttributeValue, A: Attribute>(&self, attribute: &A) -> Option<AttributeChange<T>> {
        if !self.has_changed(attribute) {
            return None;
        }
        let key = attribute.key();
        let value = self.current.get(key)?.get::<T>()?;
        let previous = self.previous.get(key)?.get::<T>()?;
        Some(AttributeChange { value, previous })
    }
}

pub(crate) fn decode_keys<A: Attribute>(keys: impl IntoIterator<Item = String>) -> Vec<A> {
    keys.into_iter()
        .filter_map(|key| {
            let decoded = A::from_key(&key);
            if decoded.is_none() {
                tracing::trace!(key = key.as_str(), "dropping attribute key unknown to catalog");
            }
            decoded
        })
        .collect()
}

impl Default for ItemChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ItemChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemChangeTracker")
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
