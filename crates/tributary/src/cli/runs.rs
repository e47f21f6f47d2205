//! `tributary runs` command implementation.

use colored::Colorize;

use super::display::{confidence, status};
use super::Context;

/// Run the runs command.
pub fn run(ctx: &Context, limit: usize, show_warnings: bool) -> Result<(), tributary::Error> {
    let tributary = ctx.open()?;
    let runs = tributary.list_runs(limit)?;

    if runs.is_empty() {
        println!("{}", "No analysis runs recorded.".dimmed());
        return Ok(());
    }

    for run in &runs {
        let aggregate = run
            .aggregate_confidence
            .map_or_else(|| "-".dimmed(), confidence);
        println!(
            "{} {} {} {} ({} ms, {} edges, {} low-certainty, {} warnings, {})",
            format!("#{}", run.id).dimmed(),
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            status(run.status),
            run.scope.white().bold(),
            run.duration_ms,
            run.edges_written,
            run.low_certainty_edges,
            run.warning_count,
            aggregate
        );
        if let Some(error) = &run.error {
            println!("    {}", error.red());
        }

        if show_warnings && run.warning_count > 0 {
            for warning in tributary.run_warnings(run.id)? {
                let line = warning
                    .line
                    .map(|l| format!(" (line {l})"))
                    .unwrap_or_default();
                println!(
                    "    {} {}: {}{}",
                    "•".dimmed(),
                    warning.kind.yellow(),
                    warning.message,
                    line.dimmed()
                );
            }
        }
    }

    Ok(())
}
