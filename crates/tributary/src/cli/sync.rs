//! `tributary sync` command implementation.

use std::path::Path;

use colored::Colorize;
use tributary::LiveObject;

use super::Context;

/// Run the sync command.
pub fn run(ctx: &Context, file: &Path) -> Result<(), tributary::Error> {
    let content = std::fs::read_to_string(file)?;
    let live: Vec<LiveObject> = serde_json::from_str(&content)?;
    let tributary = ctx.open()?;

    let report = tributary.sync(&live)?;

    println!(
        "Synchronized {} objects: {} inserted, {} deactivated",
        live.len(),
        report.inserted.to_string().green(),
        report.deactivated.to_string().yellow()
    );
    Ok(())
}
