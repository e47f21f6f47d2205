//! `tributary stats` command implementation.

use colored::Colorize;

use super::Context;

/// Run the stats command, optionally running maintenance first.
pub fn run(ctx: &Context, analyze: bool, vacuum: bool) -> Result<(), tributary::Error> {
    let tributary = ctx.open()?;

    if vacuum {
        tributary.vacuum()?;
        println!("{} database file", "Vacuumed".green().bold());
    }
    if analyze {
        tributary.analyze()?;
        println!("{} query planner statistics", "Refreshed".green().bold());
    }
    if vacuum || analyze {
        println!();
    }

    // Get database size
    let db_path = tributary.db_path();
    let db_size_str = match std::fs::metadata(db_path) {
        Ok(meta) => format_size(meta.len()),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to get database file size");
            "size unknown".to_string()
        }
    };

    let stats = tributary.stats()?;

    println!("{}", "Tributary Lineage Statistics".cyan().bold());
    println!();

    println!(
        "  {}: {} ({})",
        "Database".white().bold(),
        db_path.display(),
        db_size_str
    );
    println!();

    println!(
        "  {}: {} active, {} inactive",
        "Nodes".white().bold(),
        stats.active_nodes.to_string().green(),
        stats.inactive_nodes.to_string().dimmed()
    );
    // Sort by count descending, then by kind for deterministic output
    let mut kind_counts: Vec<_> = stats.active_nodes_by_kind.iter().collect();
    kind_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (kind, count) in kind_counts {
        println!("    {}: {}", kind.as_str().dimmed(), count);
    }
    println!();

    println!(
        "  {}: {} active, {} inactive",
        "Edges".white().bold(),
        stats.active_edges.to_string().green(),
        stats.inactive_edges.to_string().dimmed()
    );
    if stats.provisional_edges > 0 {
        println!(
            "    {} edges still provisional (interrupted run?)",
            stats.provisional_edges.to_string().yellow()
        );
    }
    println!();

    let total_runs: usize = stats.runs_by_status.values().sum();
    println!(
        "  {}: {} total",
        "Runs".white().bold(),
        total_runs.to_string().green()
    );
    for (status, count) in &stats.runs_by_status {
        println!("    {}: {}", status.dimmed(), count);
    }

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
