//! The composite query filter.
//!
//! A filter holds synth *names*; the `{name -> weak adapter}` resolver map
//! is supplied per call, so a filter value stays plain data that can be
//! cloned into async jobs and compared against the completion that comes
//! back.

use std::collections::BTreeSet;

use crate::category::Category;

/// Result ordering of a patch query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// No ORDER BY clause at all.
    None,
    /// Case-insensitive by display name.
    Name,
    /// Import batch, then bank, then program — the capture order.
    #[default]
    ImportId,
    /// Position within the filtered list; requires `list_id`.
    ListPlace,
}

/// Composite patch filter, compiled into a single parameterized statement.
///
/// Equality on filters lets a UI reject stale async results whose filter no
/// longer matches the current one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchFilter {
    /// Synth names to include. At most 99 (the bind prefix is two digits).
    pub synths: Vec<String>,
    /// Restrict to one import batch.
    pub import_id: Option<String>,
    /// Restrict to members of one list.
    pub list_id: Option<String>,
    /// Substring match on the display name.
    pub name: Option<String>,
    pub only_faves: bool,
    pub only_specific_type: bool,
    pub type_id: i32,
    pub show_hidden: bool,
    pub only_untagged: bool,
    pub categories: BTreeSet<Category>,
    /// Require all selected categories instead of any.
    pub and_categories: bool,
    pub only_duplicate_names: bool,
    pub order_by: OrderBy,
}

impl PatchFilter {
    /// Everything stored for one synth, hidden patches included.
    pub fn all_for_synth(synth_name: impl Into<String>) -> Self {
        Self {
            synths: vec![synth_name.into()],
            show_hidden: true,
            ..Default::default()
        }
    }

    /// Everything stored for a set of synths, hidden patches included.
    pub fn all_patches(synth_names: Vec<String>) -> Self {
        Self {
            synths: synth_names,
            show_hidden: true,
            ..Default::default()
        }
    }
}
