//! `catalog`: validate and summarize a transaction catalog.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use binder_fuzz_core::catalog::Catalog;
use binder_fuzz_core::fuzz::{prepare_call, ValueGenerator};

use super::{load_catalog, output};

#[derive(Parser, Debug)]
#[command(
    about = "Validate a catalog and summarize its transactions",
    long_about = "Loads the catalog the way `run` does and reports, per transaction, \
                  its target, slot count and any slots a run would skip. Transactions \
                  missing a service name or code are listed as invalid."
)]
pub struct CatalogCmd {
    /// Transaction catalog (JSON)
    #[arg(long, default_value = "./services.json")]
    pub catalog: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub path: String,
    pub transactions: usize,
    pub valid: usize,
    pub invalid: usize,
    pub entries: Vec<EntrySummary>,
}

#[derive(Debug, Serialize)]
pub struct EntrySummary {
    pub index: usize,
    pub service_name: Option<String>,
    pub code: Option<i64>,
    pub valid: bool,
    pub slots: usize,
    /// Diagnostics for slots that a run would skip.
    pub skipped_slots: Vec<String>,
}

pub fn summarize(path: &str, catalog: &Catalog) -> CatalogSummary {
    // Skips depend only on the slot schema, so any seed works.
    let mut generator = ValueGenerator::new(0);
    let entries: Vec<EntrySummary> = catalog
        .transactions
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let call = prepare_call(spec, &mut generator);
            EntrySummary {
                index,
                service_name: spec.service_name.clone(),
                code: spec.code,
                valid: call.is_some(),
                slots: spec.input_types.len(),
                skipped_slots: call
                    .map(|c| c.skipped.iter().map(|e| e.to_string()).collect())
                    .unwrap_or_default(),
            }
        })
        .collect();
    let valid = entries.iter().filter(|e| e.valid).count();

    CatalogSummary {
        path: path.to_string(),
        transactions: entries.len(),
        valid,
        invalid: entries.len() - valid,
        entries,
    }
}

impl CatalogCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let catalog = load_catalog(&self.catalog)?;
        let summary = summarize(&self.catalog.display().to_string(), &catalog);

        if json_output {
            return output::print_json(&summary);
        }

        println!("{}", output::header(&format!("Catalog: {}", summary.path)));
        println!(
            "Transactions: {} ({} valid, {} invalid)",
            summary.transactions, summary.valid, summary.invalid
        );
        for entry in &summary.entries {
            if !entry.valid {
                println!("  [{}] invalid: missing service_name or code", entry.index);
                continue;
            }
            println!(
                "  [{}] {} {} ({} slots)",
                entry.index,
                entry.service_name.as_deref().unwrap_or_default(),
                entry.code.unwrap_or_default(),
                entry.slots
            );
            for skipped in &entry.skipped_slots {
                println!("      {skipped}");
            }
        }
        Ok(())
    }
}
