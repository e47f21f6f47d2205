//! `tributary impact` command implementation.

use colored::Colorize;
use tributary::ImpactReport;

use super::display::{node_label, print_paths, print_reached};
use super::{parse_locator, Context};

/// Run the impact command.
pub fn run(
    ctx: &Context,
    target: &str,
    database: Option<String>,
    depth: Option<u32>,
    json: bool,
) -> Result<(), tributary::Error> {
    let locator = parse_locator(target, database)?;
    let tributary = ctx.open()?;

    let report = tributary.analyze_impact(&locator, depth)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_impact(&report);
    }

    Ok(())
}

/// Display impact analysis results.
fn print_impact(report: &ImpactReport) {
    println!(
        "Impact analysis for {} (depth {}):",
        node_label(&report.target).cyan().bold(),
        report.max_depth
    );
    println!();

    if report.is_empty() {
        println!("  {}", "Nothing downstream.".dimmed());
        return;
    }

    println!("  {}:", "Impacted columns by depth".white().bold());
    for (depth, count) in &report.impacted_columns_by_depth {
        println!("    {}: {}", format!("depth {depth}").dimmed(), count.to_string().yellow());
    }
    println!();

    println!(
        "  {} ({} nodes):",
        "Impacted nodes".white().bold(),
        report.impacted.len().to_string().yellow()
    );
    print_reached(&report.impacted, "(none)");
    println!();

    println!("  {}:", "Producing objects".white().bold());
    if report.impacted_objects.is_empty() {
        println!("    {}", "(no attributed edges)".dimmed());
    }
    for object in &report.impacted_objects {
        println!(
            "    {} {} ({} edges)",
            "•".dimmed(),
            node_label(&object.producer),
            object.affected_edges
        );
    }
    println!();

    println!("  {}:", "Paths".white().bold());
    print_paths(&report.steps);
}
