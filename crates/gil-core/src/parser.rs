//! TOML item bank parser.
//!
//! Loads calibrated clinical cases from TOML files and directories, and
//! validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::irt::validate_item;
use crate::model::{IrtParameters, Item, ReferenceDiagnosis};

/// A named collection of items loaded from one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBankFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl ItemBankFile {
    /// Distinct domains in file order.
    pub fn domains(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .map(|i| i.domain.as_str())
            .filter(|d| seen.insert(*d))
            .collect()
    }
}

/// Intermediate TOML structure for parsing item bank files.
#[derive(Debug, Deserialize)]
struct TomlItemBankFile {
    item_bank: TomlItemBankHeader,
    #[serde(default)]
    items: Vec<TomlItem>,
}

#[derive(Debug, Deserialize)]
struct TomlItemBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlItem {
    id: String,
    #[serde(default)]
    title: String,
    domain: String,
    difficulty: f64,
    discrimination: f64,
    #[serde(default)]
    guessing: Option<f64>,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    reference: Vec<ReferenceDiagnosis>,
}

fn default_true() -> bool {
    true
}

/// Parse a single TOML file into an [`ItemBankFile`].
pub fn parse_item_bank(path: &Path) -> Result<ItemBankFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item bank file: {}", path.display()))?;

    parse_item_bank_str(&content, path)
}

/// Parse a TOML string into an [`ItemBankFile`] (useful for testing).
pub fn parse_item_bank_str(content: &str, source_path: &Path) -> Result<ItemBankFile> {
    let parsed: TomlItemBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let items = parsed
        .items
        .into_iter()
        .map(|i| Item {
            id: i.id,
            title: i.title,
            domain: i.domain,
            parameters: IrtParameters {
                difficulty: i.difficulty,
                discrimination: i.discrimination,
                guessing: i.guessing,
            },
            reference_differential: i.reference,
            is_active: i.is_active,
        })
        .collect();

    Ok(ItemBankFile {
        id: parsed.item_bank.id,
        name: parsed.item_bank.name,
        description: parsed.item_bank.description,
        items,
    })
}

/// Recursively load all `.toml` item bank files from a directory.
pub fn load_item_bank_directory(dir: &Path) -> Result<Vec<ItemBankFile>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_item_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_item_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a file or every file under a directory.
pub fn load_item_banks(path: &Path) -> Result<Vec<ItemBankFile>> {
    if path.is_dir() {
        load_item_bank_directory(path)
    } else {
        Ok(vec![parse_item_bank(path)?])
    }
}

/// A warning from item bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate an item bank for common issues.
pub fn validate_item_bank(bank: &ItemBankFile) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Check for duplicate item IDs
    let mut seen_ids = HashSet::new();
    for item in &bank.items {
        if !seen_ids.insert(&item.id) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!("duplicate item ID: {}", item.id),
            });
        }
    }

    // Parameters the IRT engine would refuse
    for item in &bank.items {
        if let Err(e) = validate_item(item) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: e.to_string(),
            });
        }
    }

    for item in &bank.items {
        let reference = &item.reference_differential;
        if reference.is_empty() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: "no reference differential; responses will grade as 0".into(),
            });
            continue;
        }
        if !reference.iter().any(|r| r.rank == 1) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: "reference differential has no rank-1 diagnosis".into(),
            });
        }
        let mut ranks = HashSet::new();
        for r in reference {
            if !ranks.insert(r.rank) {
                warnings.push(ValidationWarning {
                    item_id: Some(item.id.clone()),
                    message: format!("duplicate reference rank {}", r.rank),
                });
            }
        }
    }

    if bank.items.iter().all(|i| !i.is_active) && !bank.items.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "every item is inactive".into(),
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[item_bank]
id = "cardio-basics"
name = "Cardiology Basics"
description = "Chest pain presentations"

[[items]]
id = "cp-001"
title = "Crushing chest pain, diaphoresis"
domain = "cardiology"
difficulty = -0.5
discrimination = 1.2

[[items.reference]]
code = "I21.9"
name = "Acute myocardial infarction"
rank = 1
weight = 2.0

[[items.reference]]
code = "I71.0"
name = "Aortic dissection"
rank = 2
is_critical = true

[[items]]
id = "cp-002"
title = "Pleuritic pain after long flight"
domain = "cardiology"
difficulty = 0.4
discrimination = 1.0
guessing = 0.2

[[items.reference]]
code = "I26.99"
name = "Pulmonary embolism"
rank = 1
"#;

    #[test]
    fn parse_valid_toml() {
        let bank = parse_item_bank_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(bank.id, "cardio-basics");
        assert_eq!(bank.items.len(), 2);
        let first = &bank.items[0];
        assert_eq!(first.reference_differential.len(), 2);
        assert!(first.reference_differential[1].is_critical);
        assert!((first.reference_differential[1].weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(bank.items[1].parameters.guessing, Some(0.2));
        assert!(bank.items[1].is_active);
        assert_eq!(bank.domains(), vec!["cardiology"]);
        assert!(validate_item_bank(&bank).is_empty());
    }

    #[test]
    fn validate_duplicate_ids_and_bad_parameters() {
        let toml = r#"
[item_bank]
id = "broken"
name = "Broken"

[[items]]
id = "same"
domain = "cardiology"
difficulty = 0.0
discrimination = 0.0

[[items.reference]]
code = "A"
name = "A"
rank = 2

[[items.reference]]
code = "B"
name = "B"
rank = 2

[[items]]
id = "same"
domain = "cardiology"
difficulty = 0.0
discrimination = 1.0
guessing = 1.5
"#;
        let bank = parse_item_bank_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_item_bank(&bank);
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate item ID")));
        assert!(messages.iter().any(|m| m.contains("discrimination")));
        assert!(messages.iter().any(|m| m.contains("guessing")));
        assert!(messages.iter().any(|m| m.contains("no rank-1")));
        assert!(messages.iter().any(|m| m.contains("duplicate reference rank")));
        assert!(messages.iter().any(|m| m.contains("no reference differential")));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_item_bank_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn parse_missing_required_parameter() {
        let toml = r#"
[item_bank]
id = "x"
name = "X"

[[items]]
id = "no-slope"
domain = "cardiology"
difficulty = 0.0
"#;
        assert!(parse_item_bank_str(toml, &PathBuf::from("x.toml")).is_err());
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bank.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not toml {").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let banks = load_item_bank_directory(dir.path()).unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].id, "cardio-basics");

        let via_path = load_item_banks(&dir.path().join("bank.toml")).unwrap();
        assert_eq!(via_path.len(), 1);
    }
}
