//! The `gil validate` command.

use std::path::PathBuf;

use anyhow::Result;

use gil_core::config::load_config_from;
use gil_core::parser;

pub fn execute(item_bank_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    // A broken config is fatal even when only item banks are checked.
    load_config_from(config_path.as_deref())?;

    let banks = parser::load_item_banks(&item_bank_path)?;

    let mut total_warnings = 0;

    for bank in &banks {
        println!(
            "Item bank: {} ({} items, domains: {})",
            bank.name,
            bank.items.len(),
            bank.domains().join(", ")
        );

        let warnings = parser::validate_item_bank(bank);
        for w in &warnings {
            let prefix = w
                .item_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All item banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
