//! Bridge between the persisted category table and the auto-tagging rules.
//!
//! The rules themselves live in a host-owned file and arrive here already
//! parsed. The engine's half of the contract is to make sure every rule
//! category owns a bit index in the `categories` table, then hand back a
//! categorizer that combines each definition with its name matchers.

use std::collections::BTreeSet;

use regex::RegexBuilder;
use rusqlite::named_params;

use crate::category::{Category, MAX_BIT_INDEX};
use crate::store::PatchDatabase;

/// One auto-tagging rule as supplied by the host's rules file.
#[derive(Debug, Clone)]
pub struct AutoCategoryRule {
    pub category: Category,
    /// Patterns matched against patch names; regular expressions with a
    /// case-insensitive substring fallback for invalid ones.
    pub matchers: Vec<String>,
}

enum Matcher {
    Pattern(regex::Regex),
    Substring(String),
}

impl Matcher {
    fn compile(raw: &str) -> Self {
        match RegexBuilder::new(raw).case_insensitive(true).build() {
            Ok(re) => Matcher::Pattern(re),
            Err(e) => {
                log::warn!(
                    "Auto-category matcher '{}' is not a valid pattern ({}), matching as substring",
                    raw,
                    e
                );
                Matcher::Substring(raw.to_lowercase())
            }
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(name),
            Matcher::Substring(needle) => name.to_lowercase().contains(needle),
        }
    }
}

/// Automatic tagging over the merged category set. Categories without
/// rules are carried along so the full tag vocabulary is in one place.
pub struct Categorizer {
    rules: Vec<(Category, Vec<Matcher>)>,
}

impl Categorizer {
    /// All categories known to this categorizer, rule-less ones included.
    pub fn categories(&self) -> Vec<Category> {
        self.rules.iter().map(|(category, _)| category.clone()).collect()
    }

    /// Categories whose matchers fire on the given patch name.
    pub fn categorize(&self, patch_name: &str) -> BTreeSet<Category> {
        self.rules
            .iter()
            .filter(|(_, matchers)| matchers.iter().any(|m| m.matches(patch_name)))
            .map(|(category, _)| category.clone())
            .collect()
    }
}

impl PatchDatabase {
    /// Merge the host's rules with the persisted category table and build
    /// a categorizer.
    ///
    /// Rule categories missing from the table get the next free bit index,
    /// all inside one transaction; on bit exhaustion the remaining rules
    /// are refused with a diagnostic and the categorizer is built from
    /// whatever fits.
    pub fn build_categorizer(&self, rules: &[AutoCategoryRule]) -> Categorizer {
        let mut definitions = self.get_categories();
        let mut bit_index = definitions.iter().map(|d| d.bit_index).max().unwrap_or(-1);

        let persist = (|| -> rusqlite::Result<()> {
            let tx = self.conn().unchecked_transaction()?;
            for rule in rules {
                let exists = definitions.iter().any(|d| d.name == rule.category.name);
                if exists {
                    continue;
                }
                if bit_index >= MAX_BIT_INDEX {
                    log::error!(
                        "Can only deal with {} different categories. Please remove some \
                         categories from the rules file!",
                        MAX_BIT_INDEX + 1
                    );
                    break;
                }
                bit_index += 1;
                tx.execute(
                    "INSERT INTO categories (bitIndex, name, color, active) \
                     VALUES (:BIT, :NAM, :COL, 1)",
                    named_params! {
                        ":BIT": bit_index,
                        ":NAM": rule.category.name,
                        ":COL": rule.category.color,
                    },
                )?;
            }
            tx.commit()
        })();
        if let Err(e) = persist {
            log::error!("DATABASE ERROR in build_categorizer: {}", e);
        }

        // Pick up whatever the transaction created.
        definitions = self.get_categories();

        let compiled = definitions
            .iter()
            .map(|def| {
                let matchers = rules
                    .iter()
                    .find(|rule| rule.category.name == def.name)
                    .map(|rule| rule.matchers.iter().map(|m| Matcher::compile(m)).collect())
                    .unwrap_or_default();
                (def.category(), matchers)
            })
            .collect();

        Categorizer { rules: compiled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{OpenMode, PatchDatabase};
    use tempfile::TempDir;

    fn rule(name: &str, matchers: &[&str]) -> AutoCategoryRule {
        AutoCategoryRule {
            category: Category::new(name, "ff123456"),
            matchers: matchers.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_rule_categories_get_bit_indexes() {
        let temp = TempDir::new().unwrap();
        let db =
            PatchDatabase::open(&temp.path().join("catalog.db3"), OpenMode::ReadWriteNoBackups)
                .unwrap();

        let categorizer =
            db.build_categorizer(&[rule("Lead", &["lead"]), rule("Chiptune", &["chip", "8.?bit"])]);

        // "Lead" was seeded already, "Chiptune" is new and got bit 15.
        let definitions = db.get_categories();
        let chiptune = definitions.iter().find(|d| d.name == "Chiptune").unwrap();
        assert_eq!(chiptune.bit_index, 15);
        assert!(chiptune.active);
        assert_eq!(categorizer.categories().len(), definitions.len());
    }

    #[test]
    fn test_categorize_matches_case_insensitively() {
        let temp = TempDir::new().unwrap();
        let db =
            PatchDatabase::open(&temp.path().join("catalog.db3"), OpenMode::ReadWriteNoBackups)
                .unwrap();

        let categorizer =
            db.build_categorizer(&[rule("Chiptune", &["chip", "8.?bit"]), rule("Bass", &["bass"])]);

        let tags = categorizer.categorize("FAT 8-BIT BASS");
        let names: Vec<_> = tags.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bass", "Chiptune"]);

        // Seeded categories without rules never fire.
        assert!(categorizer.categorize("totally ambient").is_empty());
    }
}
