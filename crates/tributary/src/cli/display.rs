//! Common display utilities for CLI commands.

use colored::{ColoredString, Colorize};
use tributary::{LineageStep, Node, ReachedNode, RunStatus, RunSummary};

const MAX_DISPLAY_ITEMS: usize = 10;

/// Confidence as a percentage, colored by how much it can be trusted.
pub fn confidence(value: f64) -> ColoredString {
    let text = format!("{:.0}%", value * 100.0);
    if value >= 0.9 {
        text.green()
    } else if value >= 0.5 {
        text.yellow()
    } else {
        text.red()
    }
}

/// A node's qualified name followed by its kind.
pub fn node_label(node: &Node) -> String {
    format!("{} {}", node.qualified_name(), format!("({})", node.kind).dimmed())
}

/// Display reached nodes with optional truncation.
///
/// Shows up to `MAX_DISPLAY_ITEMS` nodes with bullet points. If there are more,
/// shows "... and N more". If empty, shows the provided `empty_message`.
pub fn print_reached(nodes: &[ReachedNode], empty_message: &str) {
    if nodes.is_empty() {
        println!("    {}", empty_message.dimmed());
        return;
    }

    for reached in nodes.iter().take(MAX_DISPLAY_ITEMS) {
        println!(
            "    {} {} depth {}, {}",
            "•".dimmed(),
            node_label(&reached.node),
            reached.min_depth,
            confidence(reached.max_confidence)
        );
    }

    if nodes.len() > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            nodes.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Display walk steps as paths, one per line, with truncation.
pub fn print_paths(steps: &[LineageStep]) {
    for step in steps.iter().take(MAX_DISPLAY_ITEMS) {
        let via = step
            .producer
            .as_ref()
            .map(|p| format!(" via {}", p.qualified_name()))
            .unwrap_or_default();
        println!(
            "    {} {} [{}{}] {}",
            "•".dimmed(),
            step.path_description(),
            step.kind,
            via.dimmed(),
            confidence(step.cumulative_confidence)
        );
    }

    if steps.len() > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            steps.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Run status, colored.
pub fn status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Success => status.as_str().green(),
        RunStatus::PartialSuccess => status.as_str().yellow(),
        RunStatus::Failed => status.as_str().red(),
    }
}

/// One line per ingested object.
pub fn print_run_summary(run: &RunSummary) {
    println!(
        "  {} {} ({} written, {} deactivated, {} rejected)",
        status(run.status),
        run.scope.white().bold(),
        run.edges_written.to_string().green(),
        run.edges_deactivated,
        run.rejected
    );
    if let Some(error) = &run.error {
        println!("    {}", error.red());
    }
}
