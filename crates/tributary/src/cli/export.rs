//! `tributary export` command implementation.

use std::path::Path;

use clap::ValueEnum;
use colored::Colorize;

use super::Context;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Node and edge listing as JSON
    Json,
    /// Graphviz DOT
    Dot,
}

/// Run the export command.
pub fn run(
    ctx: &Context,
    format: ExportFormat,
    include_inactive: bool,
    output: Option<&Path>,
) -> Result<(), tributary::Error> {
    let tributary = ctx.open()?;
    let export = tributary.export_graph(include_inactive)?;

    let rendered = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&export)?,
        ExportFormat::Dot => export.to_dot(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!(
                "{} {} nodes and {} edges to {}",
                "Exported".green().bold(),
                export.nodes.len(),
                export.edges.len(),
                path.display()
            );
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
