//! Filter compilation.
//!
//! A [`PatchFilter`] compiles into a [`WhereClause`]: a WHERE fragment made
//! of constant text plus named placeholders, and the matching bind plan.
//! Statement text and binds travel together; no user input is ever
//! interpolated into SQL.

use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;

use crate::category::CategoryBitfield;
use crate::filter::{OrderBy, PatchFilter};

/// Two-digit bind prefix caps the synth membership list.
const MAX_SYNTHS: usize = 99;

/// A value waiting to be bound to a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Text(String),
    Int(i64),
}

impl ToSql for BindValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            BindValue::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            BindValue::Int(i) => Ok(ToSqlOutput::from(*i)),
        }
    }
}

/// WHERE fragment plus ordered bind plan, emitted together.
#[derive(Debug)]
pub(crate) struct WhereClause {
    fragment: String,
    order: String,
    binds: Vec<(String, BindValue)>,
}

impl WhereClause {
    /// Compile a filter. `collate_nocase` selects the case-insensitive name
    /// match used by `get_many`; `count` and `delete` stay case-sensitive.
    pub(crate) fn compile(
        filter: &PatchFilter,
        bitfield: &CategoryBitfield,
        collate_nocase: bool,
    ) -> Self {
        let mut fragment = String::from(" WHERE 1 == 1");
        let mut binds: Vec<(String, BindValue)> = Vec::new();

        if !filter.synths.is_empty() {
            let mut synths = filter.synths.as_slice();
            if synths.len() > MAX_SYNTHS {
                log::warn!(
                    "Filter selects {} synths, clamping to the supported {}",
                    synths.len(),
                    MAX_SYNTHS
                );
                synths = &synths[..MAX_SYNTHS];
            }
            let mut placeholders = Vec::with_capacity(synths.len());
            for (i, synth) in synths.iter().enumerate() {
                let name = format!(":S{:02}", i);
                placeholders.push(name.clone());
                binds.push((name, BindValue::Text(synth.clone())));
            }
            fragment.push_str(&format!(" AND synth IN ({})", placeholders.join(",")));
        }

        if let Some(import_id) = &filter.import_id {
            fragment.push_str(" AND sourceID = :SID");
            binds.push((":SID".to_string(), BindValue::Text(import_id.clone())));
        }

        if let Some(list_id) = &filter.list_id {
            fragment.push_str(
                " AND md5 IN (SELECT md5 FROM patch_in_list \
                 WHERE patch_in_list.id = :LID AND patch_in_list.synth = patches.synth)",
            );
            binds.push((":LID".to_string(), BindValue::Text(list_id.clone())));
        }

        if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
            fragment.push_str(" AND name LIKE :NAM");
            if collate_nocase {
                fragment.push_str(" COLLATE NOCASE");
            }
            binds.push((":NAM".to_string(), BindValue::Text(format!("%{}%", name))));
        }

        if filter.only_faves {
            fragment.push_str(" AND favorite == 1");
        }

        if filter.only_specific_type {
            fragment.push_str(" AND type == :TYP");
            binds.push((":TYP".to_string(), BindValue::Int(filter.type_id as i64)));
        }

        if !filter.show_hidden {
            fragment.push_str(" AND (hidden is null or hidden != 1)");
        }

        if filter.only_untagged {
            fragment.push_str(" AND categories == 0");
        } else if !filter.categories.is_empty() {
            if filter.and_categories {
                fragment.push_str(" AND (categories & :CAT == :CAT)");
            } else {
                fragment.push_str(" AND (categories & :CAT != 0)");
            }
            binds.push((
                ":CAT".to_string(),
                BindValue::Int(bitfield.encode(&filter.categories)),
            ));
        }

        if filter.only_duplicate_names {
            fragment.push_str(
                " AND name IN (SELECT name FROM patches GROUP BY synth, name HAVING count(*) > 1)",
            );
        }

        let order = order_clause(filter);

        Self {
            fragment,
            order,
            binds,
        }
    }

    /// The WHERE fragment without ordering, for `count` and `delete`.
    pub(crate) fn fragment(&self) -> &str {
        &self.fragment
    }

    /// WHERE fragment plus the ORDER BY clause, for `get_many`.
    pub(crate) fn fragment_with_order(&self) -> String {
        format!("{}{}", self.fragment, self.order)
    }

    /// The bind plan matching the fragment's placeholders.
    pub(crate) fn params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.binds
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn bind_count(&self) -> usize {
        self.binds.len()
    }
}

/// ORDER BY clause for a query, driven by the filter's `order_by`.
fn order_clause(filter: &PatchFilter) -> String {
    match filter.order_by {
        OrderBy::None => String::new(),
        OrderBy::Name => " ORDER BY name COLLATE NOCASE".to_string(),
        OrderBy::ImportId => " ORDER BY sourceID, midiBankNo, midiProgramNo".to_string(),
        OrderBy::ListPlace => {
            if filter.list_id.is_some() {
                " ORDER BY (SELECT order_num FROM patch_in_list \
                 WHERE patch_in_list.id = :LID AND patch_in_list.synth = patches.synth \
                 AND patch_in_list.md5 = patches.md5)"
                    .to_string()
            } else {
                log::warn!("order_by = ListPlace without a list filter, falling back to import order");
                " ORDER BY sourceID, midiBankNo, midiProgramNo".to_string()
            }
        }
    }
}
