//! Categories and their bitfield representation.
//!
//! The catalog stores the category set of a patch as a 63-bit integer so
//! that tag filters stay indexable (`categories & :CAT != 0`). The mapping
//! between category names and bit positions lives in the `categories`
//! table; [`CategoryBitfield`] is an immutable snapshot of the *active*
//! definitions used to translate between the two representations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Highest usable bit position. The mask is stored in a signed 64-bit
/// column, so bit 63 stays unused and no sign-extension can occur.
pub const MAX_BIT_INDEX: i32 = 62;

/// A user-visible tag. Ordered and compared by name; the color is an
/// opaque display string carried along for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Category {}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// A persisted row of the `categories` table.
///
/// Definitions are never deleted; retiring a tag clears `active`, which
/// hides it from the bitfield while keeping historical bits intact. A
/// latent bit reappears if its definition is re-activated.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDefinition {
    pub bit_index: i32,
    pub name: String,
    pub color: String,
    pub active: bool,
}

impl CategoryDefinition {
    pub fn category(&self) -> Category {
        Category::new(self.name.clone(), self.color.clone())
    }
}

/// Snapshot of the active category definitions, ascending by bit index.
///
/// Treat as a copy-on-write value: the store rebuilds it inside the
/// category critical section whenever definitions change, readers keep
/// whatever snapshot they cloned.
#[derive(Debug, Clone, Default)]
pub struct CategoryBitfield {
    bit_names: Vec<CategoryDefinition>,
}

impl CategoryBitfield {
    /// Build from active definitions. Inactive entries are filtered out,
    /// the rest sorted by bit index.
    pub fn new(definitions: Vec<CategoryDefinition>) -> Self {
        let mut bit_names: Vec<_> = definitions.into_iter().filter(|d| d.active).collect();
        bit_names.sort_by_key(|d| d.bit_index);
        Self { bit_names }
    }

    /// Encode a category set into its bit mask.
    ///
    /// Unknown or retired names are skipped so that a stale category in a
    /// user's set does not abort a save; the skip is logged at debug level.
    pub fn encode(&self, categories: &BTreeSet<Category>) -> i64 {
        let mut mask: i64 = 0;
        for category in categories {
            match self.bit_index_for(&category.name) {
                Some(bit_index) => mask |= 1i64 << bit_index,
                None => log::debug!(
                    "Category '{}' has no active definition, dropping from bitfield",
                    category.name
                ),
            }
        }
        mask
    }

    /// Decode a bit mask into the set of matching active categories.
    /// Bits with no live definition are dropped.
    pub fn decode(&self, mask: i64) -> BTreeSet<Category> {
        let mut result = BTreeSet::new();
        for i in 0..=MAX_BIT_INDEX {
            if mask & (1i64 << i) != 0 {
                if let Some(def) = self.bit_names.iter().find(|d| d.bit_index == i) {
                    result.insert(def.category());
                }
            }
        }
        result
    }

    /// All active categories, ascending by bit index.
    pub fn categories(&self) -> Vec<Category> {
        self.bit_names.iter().map(|d| d.category()).collect()
    }

    /// Highest bit index in use, or -1 when no definition is active.
    pub fn max_bit_index(&self) -> i32 {
        self.bit_names.iter().map(|d| d.bit_index).max().unwrap_or(-1)
    }

    fn bit_index_for(&self, name: &str) -> Option<i32> {
        self.bit_names
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.bit_index)
    }
}
