//! `generate`: dry run that prints the commands a run would issue.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use binder_fuzz_core::fuzz::{prepare_call, Invocation, OrderingCounter, SequenceId, ValueGenerator};

use super::{load_catalog, output};

#[derive(Parser, Debug)]
#[command(
    about = "Print generated commands without invoking the bridge",
    long_about = "Walks the catalog like a single worker would and prints each \
                  `service call` command with freshly generated arguments. Nothing \
                  is executed, so no device is needed."
)]
pub struct GenerateCmd {
    /// Transaction catalog (JSON)
    #[arg(long, default_value = "./services.json")]
    pub catalog: PathBuf,

    /// Number of passes over the catalog
    #[arg(long, default_value = "1")]
    pub rounds: u32,

    /// Random seed (default: random)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Program placed at the head of each command
    #[arg(long, default_value = "adb")]
    pub bridge: String,
}

#[derive(Debug, Serialize)]
pub struct GeneratedCall {
    pub sequence_id: Option<SequenceId>,
    pub command: Vec<String>,
    pub diagnostics: Vec<String>,
}

impl GenerateCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let catalog = load_catalog(&self.catalog)?;
        let mut generator = match self.seed {
            Some(seed) => ValueGenerator::new(seed),
            None => ValueGenerator::from_entropy(),
        };
        let counter = OrderingCounter::new();

        let mut calls = Vec::new();
        for _ in 0..self.rounds {
            for spec in &catalog.transactions {
                let Some(call) = prepare_call(spec, &mut generator) else {
                    calls.push(GeneratedCall {
                        sequence_id: None,
                        command: Vec::new(),
                        diagnostics: vec!["Invalid transaction data, skipping...".to_string()],
                    });
                    continue;
                };
                let diagnostics = call.skipped.iter().map(|e| e.to_string()).collect();
                let invocation =
                    Invocation::service_call(&self.bridge, call.service_name, call.code, call.tokens);
                calls.push(GeneratedCall {
                    sequence_id: Some(counter.next_id()),
                    command: invocation.argv(),
                    diagnostics,
                });
            }
        }

        if json_output {
            return output::print_json(&calls);
        }
        for call in &calls {
            for diagnostic in &call.diagnostics {
                println!("{diagnostic}");
            }
            if let Some(seq) = call.sequence_id {
                println!("[{seq}] {}", call.command.join(" "));
            }
        }
        Ok(())
    }
}
