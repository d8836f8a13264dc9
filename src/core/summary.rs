//! Change summary across a whole result set
//!
//! A [`ResultSetChangeSummary`] is taken at one instant: it copies every
//! item's tracker when it is built, so later snapshot updates on the live
//! items never leak into a summary that was already handed out.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::attribute::Attribute;
use super::item::TrackedItem;
use super::tracker::{decode_keys, ItemChangeTracker};
use super::value::FromAttributeValue;

#[derive(Debug, Clone)]
struct SummaryEntry<I> {
    item: I,
    tracker: ItemChangeTracker,
}

/// New and previous value of one attribute on one item
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedValue<'a, I, T> {
    pub item: &'a I,
    pub value: T,
    pub previous: T,
}

#[derive(Clone)]
pub struct ResultSetChangeSummary<I: TrackedItem> {
    id: Uuid,
    observed_at: DateTime<Utc>,
    entries: Vec<SummaryEntry<I>>,
    index: HashMap<I::Id, usize>,
    changed_keys: OnceCell<Vec<String>>,
}

impl<I: TrackedItem + Clone> ResultSetChangeSummary<I> {
    /// Summarize the items as they are right now
    pub fn new(items: &[I]) -> Self {
        let entries: Vec<SummaryEntry<I>> = items
            .iter()
            .map(|item| SummaryEntry {
                item: item.clone(),
                tracker: item.tracker().clone(),
            })
            .collect();

        let index = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.item.item_id(), idx))
            .collect();

        let summary = Self {
            id: Uuid::new_v4(),
            observed_at: Utc::now(),
            entries,
            index,
            changed_keys: OnceCell::new(),
        };
        tracing::debug!(id = %summary.id, items = summary.entries.len(), "built result set change summary");
        summary
    }

    /// Placeholder used before the first result set is observed
    pub fn empty() -> Self {
        Self::new(&[])
    }
}

impl<I: TrackedItem> ResultSetChangeSummary<I> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Items in the order the summary was built from
    pub fn items(&self) -> impl Iterator<Item = &I> {
        self.entries.iter().map(|entry| &entry.item)
    }

    /// The tracker copy taken for an item
    pub fn tracker(&self, id: &I::Id) -> Option<&ItemChangeTracker> {
        self.index.get(id).map(|&idx| &self.entries[idx].tracker)
    }

    /// Keys that changed on at least one item, each once, in first-seen order
    pub fn changed_keys(&self) -> &[String] {
        self.changed_keys.get_or_init(|| {
            let mut seen = HashSet::new();
            let mut keys = Vec::new();
            for entry in &self.entries {
                for key in entry.tracker.changed_keys_excluding(&seen) {
                    seen.insert(key.clone());
                    keys.push(key);
                }
            }
            keys
        })
    }

    pub fn changed_attributes<A: Attribute>(&self) -> Vec<A> {
        decode_keys(self.changed_keys().iter().cloned())
    }

    pub fn did_change<A: Attribute>(&self, attribute: &A) -> bool {
        self.entries.iter().any(|entry| entry.tracker.has_changed(attribute))
    }

    pub fn changed_items<A: Attribute>(&self, attribute: &A) -> Vec<&I> {
        self.entries
            .iter()
            .filter(|entry| entry.tracker.has_changed(attribute))
            .map(|entry| &entry.item)
            .collect()
    }

    /// Items whose attribute changed and is present as `T` on both sides
    pub fn changed_values<T: FromAttributeValue, A: Attribute>(&self, attribute: &A) -> Vec<ChangedValue<'_, I, T>> {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry.tracker.change::<T, A>(attribute).map(|change| ChangedValue {
                    item: &entry.item,
                    value: change.value,
                    previous: change.previous,
                })
            })
            .collect()
    }
}

impl<I: TrackedItem + fmt::Debug> fmt::Debug for ResultSetChangeSummary<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSetChangeSummary")
            .field("id", &self.id)
            .field("observed_at", &self.observed_at)
            .field("items", &self.entries.iter().map(|e| &e.item).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<I: TrackedItem + Clone> Default for ResultSetChangeSummary<I> {
    fn default() -> Self {
        Self::empty()
    }
}

// Each summary is its own observation; content never makes two equal.
impl<I: TrackedItem> PartialEq for ResultSetChangeSummary<I> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<I: TrackedItem> Eq for ResultSetChangeSummary<I> {}

impl<I: TrackedItem> Hash for ResultSetChangeSummary<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attribute::MetadataAttribute;
    use crate::core::item::MetadataItem;
    use crate::core::snapshot::AttributeSnapshot;

    fn item(id: u64, before: AttributeSnapshot, after: AttributeSnapshot) -> MetadataItem {
        MetadataItem::new(id, format!("/results/{}.txt", id))
            .with_snapshot(before)
            .with_snapshot(after)
    }

    fn sized(size: i64, name: &str) -> AttributeSnapshot {
        AttributeSnapshot::new()
            .with(&MetadataAttribute::FileSize, size)
            .with(&MetadataAttribute::FileName, name)
    }

    fn sample_items() -> Vec<MetadataItem> {
        vec![
            item(1, sized(1, "a"), sized(2, "a")),
            item(2, sized(5, "b"), sized(5, "b2")),
            item(3, sized(7, "c"), sized(8, "c")),
            item(4, sized(9, "d"), sized(9, "d")),
        ]
    }

    #[test]
    fn test_empty_summary() {
        let summary = ResultSetChangeSummary::<MetadataItem>::empty();
        assert!(summary.is_empty());
        assert!(summary.changed_attributes::<MetadataAttribute>().is_empty());
        assert!(!summary.did_change(&MetadataAttribute::FileSize));
    }

    #[test]
    fn test_changed_attributes_deduplicated_in_first_seen_order() {
        let summary = ResultSetChangeSummary::new(&sample_items());

        assert_eq!(
            summary.changed_attributes::<MetadataAttribute>(),
            vec![MetadataAttribute::FileSize, MetadataAttribute::FileName]
        );
    }

    #[test]
    fn test_aggregate_matches_union_of_items() {
        let items = sample_items();
        let summary = ResultSetChangeSummary::new(&items);

        let mut union: Vec<String> = Vec::new();
        for item in &items {
            for key in item.tracker().clone().changed_keys() {
                if !union.contains(&key) {
                    union.push(key);
                }
            }
        }

        let mut aggregate = summary.changed_keys().to_vec();
        aggregate.sort();
        union.sort();
        assert_eq!(aggregate, union);
    }

    #[test]
    fn test_changed_items_after_aggregate() {
        let summary = ResultSetChangeSummary::new(&sample_items());
        summary.changed_keys();

        // Item 3 was excluded from recomputing FileSize during aggregation
        let ids: Vec<u64> = summary
            .changed_items(&MetadataAttribute::FileSize)
            .iter()
            .map(|item| item.id())
            .collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(summary.did_change(&MetadataAttribute::FileName));
        assert!(!summary.did_change(&MetadataAttribute::Title));
    }

    #[test]
    fn test_changed_values_skip_type_mismatch() {
        let summary = ResultSetChangeSummary::new(&sample_items());

        let sizes = summary.changed_values::<i64, _>(&MetadataAttribute::FileSize);
        let pairs: Vec<(u64, i64, i64)> = sizes.iter().map(|c| (c.item.id(), c.value, c.previous)).collect();
        assert_eq!(pairs, vec![(1, 2, 1), (3, 8, 7)]);

        assert!(summary.changed_values::<String, _>(&MetadataAttribute::FileSize).is_empty());
    }

    #[test]
    fn test_summary_is_isolated_from_later_updates() {
        let mut items = sample_items();
        let summary = ResultSetChangeSummary::new(&items);

        items[3].update(sized(10, "d"));

        assert_eq!(summary.changed_items(&MetadataAttribute::FileSize).len(), 2);
        assert!(items[3].tracker().has_changed(&MetadataAttribute::FileSize));
        let tracker = summary.tracker(&4).expect("tracker for item 4");
        assert!(!tracker.has_changed(&MetadataAttribute::FileSize));
    }

    #[test]
    fn test_identity_equality() {
        let items = sample_items();
        let a = ResultSetChangeSummary::new(&items);
        let b = ResultSetChangeSummary::new(&items);

        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let mut set = std::collections::HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(a);
        assert_eq!(set.len(), 2);
    }
}
