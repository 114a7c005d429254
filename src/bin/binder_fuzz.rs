//! binder-fuzz: randomized fuzzing of Binder `service call` entrypoints
//!
//! Drives an Android device through `adb shell service call`, generating
//! argument payloads from a JSON transaction catalog and restarting the whole
//! harness whenever the device crashes or disappears.
//!
//! ## Commands
//!
//! - **run**: Fuzz every catalog transaction on all cores until stopped
//! - **catalog**: Validate a catalog and summarize its transactions
//! - **generate**: Print the commands a run would issue, without a device
//!
//! ## Example Usage
//!
//! ```bash
//! # Fuzz with the default catalog and log files
//! binder-fuzz run --catalog services.json
//!
//! # Reproducible run on four workers, no logcat capture
//! binder-fuzz run --workers 4 --seed 42 --no-capture
//!
//! # Preview two passes over the catalog
//! binder-fuzz generate --rounds 2 --seed 7
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod fuzz_cli;

use fuzz_cli::{catalog::CatalogCmd, generate::GenerateCmd, run::RunCmd};

#[derive(Parser)]
#[command(
    name = "binder-fuzz",
    author,
    version,
    about = "Randomized fuzzing harness for Binder service calls",
    long_about = "Fuzzes Android Binder services through `adb shell service call`.\n\n\
                  Arguments are generated from a JSON transaction catalog; crashes and \
                  lost devices tear down every worker and restart the harness."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug-level diagnostics on stderr)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzz the catalog until a fatal condition ends the run
    Run(RunCmd),

    /// Validate a catalog and summarize its transactions
    Catalog(CatalogCmd),

    /// Print generated commands without invoking the bridge
    Generate(GenerateCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        command,
        json,
        verbose,
    } = Cli::parse();
    fuzz_cli::init_tracing(verbose);

    match command {
        Commands::Run(cmd) => {
            let code = cmd.execute(json).await?;
            std::process::exit(code);
        }
        Commands::Catalog(cmd) => cmd.execute(json),
        Commands::Generate(cmd) => cmd.execute(json),
    }
}
