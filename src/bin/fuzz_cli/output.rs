//! Output helpers shared by subcommands.

use anyhow::Result;
use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Bold section header for human-readable output.
pub fn header(title: &str) -> String {
    format!("\x1b[1m{title}\x1b[0m")
}
