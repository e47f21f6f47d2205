//! CLI command implementations.

mod display;

pub mod export;
pub mod impact;
pub mod ingest;
pub mod init;
pub mod runs;
pub mod stats;
pub mod sync;
pub mod trace;
pub mod wipe;

use std::path::{Path, PathBuf};

use tributary::{Config, NodeLocator, Tributary, CONFIG_FILE_NAME, TRIBUTARY_DIR_NAME};

/// Global options shared by every command.
pub struct Context {
    db: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl Context {
    pub fn new(db: Option<PathBuf>, config: Option<PathBuf>) -> Self {
        Self { db, config }
    }

    /// The `--db` override, if given.
    pub fn db_override(&self) -> Option<&PathBuf> {
        self.db.as_ref()
    }

    /// Configuration file in effect: `--config` or the conventional location.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| Path::new(TRIBUTARY_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration, applying the `--db` override.
    pub fn load_config(&self) -> Result<Config, tributary::Error> {
        let path = self.config_path();
        let mut config = if self.config.is_some() {
            Config::load(&path)?
        } else {
            Config::load_or_default(&path)?
        };
        if let Some(db) = &self.db {
            config.database_path.clone_from(db);
        }
        Ok(config)
    }

    /// Open the lineage database.
    pub fn open(&self) -> Result<Tributary, tributary::Error> {
        Tributary::open(self.load_config()?)
    }
}

/// Parse a command-line target into a locator.
///
/// Accepts `schema.object`, `schema.object.column` and
/// `database.schema.object.column`. `--database` applies to the shorter forms.
pub fn parse_locator(target: &str, database: Option<String>) -> Result<NodeLocator, tributary::Error> {
    let parts: Vec<&str> = target.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(tributary::Error::Config(format!(
            "invalid target '{target}': empty name part"
        )));
    }

    let locator = match parts.as_slice() {
        [schema, object] => NodeLocator::new(*schema, *object),
        [schema, object, column] => NodeLocator::new(*schema, *object).column(*column),
        [db, schema, object, column] => {
            if database.as_deref().is_some_and(|d| d != *db) {
                return Err(tributary::Error::Config(format!(
                    "target '{target}' names database '{db}' but --database is '{}'",
                    database.unwrap_or_default()
                )));
            }
            return Ok(NodeLocator::new(*schema, *object)
                .column(*column)
                .in_database(*db));
        }
        _ => {
            return Err(tributary::Error::Config(format!(
                "invalid target '{target}': expected schema.object[.column] or database.schema.object.column"
            )));
        }
    };

    Ok(match database {
        Some(db) => locator.in_database(db),
        None => locator,
    })
}
