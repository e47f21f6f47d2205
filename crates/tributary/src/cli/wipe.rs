//! `tributary wipe` command implementation.

use colored::Colorize;

use super::Context;

/// Run the wipe command.
pub fn run(ctx: &Context, confirmed: bool) -> Result<(), tributary::Error> {
    let tributary = ctx.open()?;

    let report = tributary.wipe(confirmed)?;

    if report.performed {
        println!("{}: {}", "Wiped".red().bold(), report.message);
    } else {
        println!("{}: {}", "Skipped".yellow().bold(), report.message);
        println!("  {}", "Re-run with --yes to delete all lineage data.".dimmed());
    }
    Ok(())
}
