//! Attribute identifiers
//!
//! The change tracker works on raw string keys. An [`Attribute`] is anything
//! that can be turned into such a key and, when possible, recovered from one.
//! [`MetadataAttribute`] is the catalog used by the bundled scanner and CLI.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named attribute with a stable string key
pub trait Attribute: Sized + Clone + Eq + Hash {
    /// Key used inside attribute snapshots
    fn key(&self) -> &str;

    /// Decode a snapshot key, `None` when the key is not part of the catalog
    fn from_key(key: &str) -> Option<Self>;
}

/// Raw keys are their own catalog; every key decodes.
impl Attribute for String {
    fn key(&self) -> &str {
        self
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(key.to_string())
    }
}

macro_rules! metadata_attributes {
    ($($(#[$doc:meta])* $variant:ident => $key:literal),* $(,)?) => {
        /// File metadata attributes understood by the scanner
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum MetadataAttribute {
            $($(#[$doc])* $variant,)*
        }

        impl MetadataAttribute {
            /// Every attribute in the catalog
            pub const ALL: &'static [MetadataAttribute] = &[$(MetadataAttribute::$variant,)*];

            pub fn as_key(&self) -> &'static str {
                match self {
                    $(MetadataAttribute::$variant => $key,)*
                }
            }
        }

        impl Attribute for MetadataAttribute {
            fn key(&self) -> &str {
                self.as_key()
            }

            fn from_key(key: &str) -> Option<Self> {
                match key {
                    $($key => Some(MetadataAttribute::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

metadata_attributes! {
    /// Full path of the item
    Path => "kMDItemPath",
    /// File name including extension
    FileName => "kMDItemFSName",
    DisplayName => "kMDItemDisplayName",
    FileExtension => "kMDItemFSExtension",
    /// Logical size in bytes
    FileSize => "kMDItemFSSize",
    PhysicalSize => "kMDItemPhysicalSize",
    IsDirectory => "kMDItemFSIsDirectory",
    IsReadOnly => "kMDItemFSIsReadOnly",
    IsHidden => "kMDItemFSInvisible",
    CreationDate => "kMDItemFSCreationDate",
    ModificationDate => "kMDItemFSContentChangeDate",
    LastUsedDate => "kMDItemLastUsedDate",
    AddedDate => "kMDItemDateAdded",
    ContentType => "kMDItemContentType",
    ContentTypeTree => "kMDItemContentTypeTree",
    Kind => "kMDItemKind",
    Title => "kMDItemTitle",
    Authors => "kMDItemAuthors",
    Keywords => "kMDItemKeywords",
    Tags => "kMDItemUserTags",
    Comment => "kMDItemFinderComment",
    Creator => "kMDItemCreator",
    PixelWidth => "kMDItemPixelWidth",
    PixelHeight => "kMDItemPixelHeight",
    Duration => "kMDItemDurationSeconds",
    PageCount => "kMDItemNumberOfPages",
    WhereFroms => "kMDItemWhereFroms",
    OwnerUserId => "kMDItemFSOwnerUserID",
}

impl fmt::Display for MetadataAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl FromStr for MetadataAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <MetadataAttribute as Attribute>::from_key(s).ok_or_else(|| format!("unknown attribute: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_keys_round_trip() {
        for attribute in MetadataAttribute::ALL {
            assert_eq!(MetadataAttribute::from_key(attribute.key()), Some(*attribute));
        }
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(MetadataAttribute::from_key("kMDItemNotAThing"), None);
        assert!("kMDItemNotAThing".parse::<MetadataAttribute>().is_err());
        assert_eq!("kMDItemFSSize".parse::<MetadataAttribute>(), Ok(MetadataAttribute::FileSize));
    }

    #[test]
    fn test_string_catalog_accepts_anything() {
        assert_eq!(String::from_key("custom"), Some("custom".to_string()));
    }
}
