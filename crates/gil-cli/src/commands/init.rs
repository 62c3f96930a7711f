//! The `gil init` command.

use anyhow::Result;

use gil_core::EngineConfig;

pub fn execute() -> Result<()> {
    if std::path::Path::new("gil.toml").exists() {
        println!("gil.toml already exists, skipping.");
    } else {
        let defaults = toml::to_string_pretty(&EngineConfig::default())?;
        std::fs::write("gil.toml", format!("{CONFIG_HEADER}\n{defaults}"))?;
        println!("Created gil.toml");
    }

    std::fs::create_dir_all("item-banks")?;
    let example_path = std::path::Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ITEM_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Tune gil.toml (or override with GIL_* environment variables)");
    println!("  2. Run: gil validate --item-bank item-banks/example.toml");
    println!(
        "  3. Run: gil simulate --item-bank item-banks/example.toml --domain cardiology --abilities=-1,0,1.5"
    );

    Ok(())
}

const CONFIG_HEADER: &str = "# gil engine configuration\n#\n# Every value below is the built-in default.";

const EXAMPLE_ITEM_BANK: &str = r#"[item_bank]
id = "example"
name = "Example Item Bank"
description = "A few cardiology vignettes to get started"

[[items]]
id = "chest-pain-01"
title = "Crushing chest pain radiating to the left arm"
domain = "cardiology"
difficulty = -1.0
discrimination = 1.2

[[items.reference]]
code = "I21.9"
name = "Acute myocardial infarction"
rank = 1
is_critical = true

[[items.reference]]
code = "I20.0"
name = "Unstable angina"
rank = 2
weight = 0.5

[[items]]
id = "dyspnea-02"
title = "Progressive dyspnea with bibasal crackles"
domain = "cardiology"
difficulty = 0.0
discrimination = 1.0

[[items.reference]]
code = "I50.9"
name = "Heart failure"
rank = 1

[[items.reference]]
code = "J18.9"
name = "Pneumonia"
rank = 2
weight = 0.5

[[items]]
id = "syncope-03"
title = "Exertional syncope with a systolic murmur"
domain = "cardiology"
difficulty = 1.0
discrimination = 1.4
guessing = 0.1

[[items.reference]]
code = "I35.0"
name = "Aortic stenosis"
rank = 1
is_critical = true

[[items.reference]]
code = "I42.1"
name = "Hypertrophic obstructive cardiomyopathy"
rank = 2
is_critical = true
"#;
