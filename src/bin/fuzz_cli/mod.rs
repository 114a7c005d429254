//! Subcommands of the binder-fuzz CLI.

pub mod catalog;
pub mod generate;
pub mod output;
pub mod run;

use std::path::Path;

use anyhow::Result;
use binder_fuzz_core::catalog::Catalog;
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let catalog = Catalog::load(path)?;
    tracing::debug!(path = %path.display(), transactions = catalog.len(), "catalog loaded");
    Ok(catalog)
}
