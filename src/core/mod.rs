//! Core functionality module
//!
//! Contains attribute snapshots, per-item change tracking, result-set
//! summaries and folder scope filtering. Nothing in here performs I/O.

pub mod attribute;
pub mod value;
pub mod snapshot;
pub mod tracker;
pub mod item;
pub mod summary;
pub mod filter;

// Re-export main types
pub use attribute::{Attribute, MetadataAttribute};
pub use value::{AttributeValue, Comparison, FromAttributeValue};
pub use snapshot::AttributeSnapshot;
pub use tracker::{AttributeChange, ItemChangeTracker, StandardComparator, ValueComparator};
pub use item::{HasPath, ItemRecord, MetadataItem, TrackedItem};
pub use summary::{ChangedValue, ResultSetChangeSummary};
pub use filter::{filter_by_depth, standardized_components, PathSpec, ScopedDepthFilter};
