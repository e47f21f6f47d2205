//! `tributary ingest` command implementation.

use std::path::Path;

use colored::Colorize;
use serde::Deserialize;
use tributary::{ObjectAnalysis, RunStatus};

use super::display::print_run_summary;
use super::Context;

/// Analyzer output: a single object or a batch.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisInput {
    One(Box<ObjectAnalysis>),
    Many(Vec<ObjectAnalysis>),
}

/// Run the ingest command.
pub fn run(ctx: &Context, file: &Path) -> Result<(), tributary::Error> {
    let content = std::fs::read_to_string(file)?;
    let input: AnalysisInput = serde_json::from_str(&content)?;
    let tributary = ctx.open()?;

    match input {
        AnalysisInput::One(analysis) => {
            let summary = tributary.ingest(&analysis)?;
            print_run_summary(&summary);
        }
        AnalysisInput::Many(analyses) => {
            let batch = tributary.ingest_batch(&analyses);
            for summary in &batch.runs {
                print_run_summary(summary);
            }
            for error in &batch.errors {
                println!("  {} {}: {}", "error".red(), error.scope.white().bold(), error.message);
            }

            println!();
            println!(
                "{} objects: {} succeeded, {} partial, {} failed, {} edges written",
                analyses.len(),
                batch.count(RunStatus::Success).to_string().green(),
                batch.count(RunStatus::PartialSuccess).to_string().yellow(),
                (batch.count(RunStatus::Failed) + batch.errors.len())
                    .to_string()
                    .red(),
                batch.edges_written()
            );
        }
    }

    Ok(())
}
