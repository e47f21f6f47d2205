//! `tributary init` command implementation.

use colored::Colorize;
use tributary::Config;

use super::Context;

/// Run the init command.
pub fn run(ctx: &Context, force: bool) -> Result<(), tributary::Error> {
    let path = ctx.config_path();
    if path.exists() && !force {
        return Err(tributary::Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let mut config = Config::default();
    if let Some(db) = ctx.db_override() {
        config.database_path.clone_from(db);
    }
    config.save(&path)?;

    println!("{} {}", "Created".green().bold(), path.display());
    Ok(())
}
