//! `tributary trace` command implementation.

use colored::Colorize;

use super::display::{node_label, print_paths, print_reached};
use super::{parse_locator, Context};

/// Run the trace command.
pub fn run(
    ctx: &Context,
    target: &str,
    database: Option<String>,
    depth: Option<u32>,
    json: bool,
) -> Result<(), tributary::Error> {
    let locator = parse_locator(target, database)?;
    let tributary = ctx.open()?;

    let report = tributary.trace_origin(&locator, depth)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Origin of {} (depth {}):",
        node_label(&report.target).cyan().bold(),
        report.max_depth
    );
    println!();

    println!(
        "  {} ({}):",
        "True sources".white().bold(),
        report.true_sources.len().to_string().green()
    );
    print_reached(&report.true_sources, "(none within depth)");
    println!();

    println!("  {}:", "Lineage chain".white().bold());
    if report.chain.is_empty() {
        println!("    {}", "(no upstream lineage recorded)".dimmed());
    } else {
        print_paths(&report.chain);
    }

    Ok(())
}
