//! Run ledger: append-only record of analysis runs and their warnings.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::helpers::{row_to_run, row_to_warning, RUNS_COLUMNS};
use super::Store;
use crate::error::Result;
use crate::types::{Run, RunId, RunRecord, RunWarning};

impl Store {
    /// Append a run and its warnings in one transaction.
    pub fn record_run(&self, record: &RunRecord) -> Result<RunId> {
        let duration_ms = (record.finished_at - record.started_at)
            .num_milliseconds()
            .max(0);

        let id = self.write(|tx| {
            let id: i64 = tx.query_row(
                "INSERT INTO runs (scope, started_at, finished_at, duration_ms, edges_written,
                                   warning_count, low_certainty_edges, aggregate_confidence,
                                   status, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 RETURNING id",
                params![
                    record.scope,
                    record.started_at.timestamp_millis(),
                    record.finished_at.timestamp_millis(),
                    duration_ms,
                    record.edges_written,
                    record.warnings.len(),
                    record.low_certainty_edges,
                    record.aggregate_confidence,
                    record.status.as_str(),
                    record.error
                ],
                |row| row.get(0),
            )?;

            let mut stmt = tx.prepare(
                "INSERT INTO run_warnings (run_id, kind, message, line, column_number)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for warning in &record.warnings {
                stmt.execute(params![
                    id,
                    warning.kind,
                    warning.message,
                    warning.line,
                    warning.column
                ])?;
            }

            Ok(RunId::from(id))
        })?;

        debug!(
            run = %id,
            scope = %record.scope,
            status = %record.status,
            edges = record.edges_written,
            warnings = record.warnings.len(),
            "Recorded analysis run"
        );

        Ok(id)
    }

    /// Get a run by ID.
    pub fn get_run(&self, id: RunId) -> Result<Option<Run>> {
        let conn = self.connection()?;

        conn.query_row(
            &format!("SELECT {RUNS_COLUMNS} FROM runs WHERE id = ?1"),
            [id.as_i64()],
            row_to_run,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {RUNS_COLUMNS} FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1"
        ))?;
        let runs = stmt
            .query_map([limit], row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Warnings recorded for a run, in the order they were raised.
    pub fn run_warnings(&self, id: RunId) -> Result<Vec<RunWarning>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(
            "SELECT kind, message, line, column_number FROM run_warnings
             WHERE run_id = ?1 ORDER BY id",
        )?;
        let warnings = stmt
            .query_map([id.as_i64()], row_to_warning)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::db::test_support::temp_store;
    use crate::types::{RunRecord, RunStatus, RunWarning};

    fn record(scope: &str, status: RunStatus) -> RunRecord {
        let started_at = Utc::now();
        RunRecord {
            scope: scope.to_string(),
            started_at,
            finished_at: started_at + Duration::milliseconds(42),
            edges_written: 3,
            low_certainty_edges: 1,
            aggregate_confidence: Some(0.8),
            status,
            error: None,
            warnings: vec![
                RunWarning::new("dynamic_sql", "EXEC with a variable").at_line(Some(10)),
                RunWarning::new("rejected_edge", "self reference"),
            ],
        }
    }

    #[test]
    fn record_run_stores_counts_and_warnings() {
        let (_dir, store) = temp_store();

        let id = store
            .record_run(&record("db.dbo.load", RunStatus::PartialSuccess))
            .unwrap();

        let run = store.get_run(id).unwrap().expect("run should exist");
        assert_eq!(run.scope, "db.dbo.load");
        assert_eq!(run.status, RunStatus::PartialSuccess);
        assert_eq!(run.duration_ms, 42);
        assert_eq!(run.edges_written, 3);
        assert_eq!(run.warning_count, 2);
        assert_eq!(run.aggregate_confidence, Some(0.8));

        let warnings = store.run_warnings(id).unwrap();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].kind, "dynamic_sql");
        assert_eq!(warnings[0].line, Some(10));
    }

    #[test]
    fn list_runs_is_newest_first_and_limited() {
        let (_dir, store) = temp_store();
        let mut older = record("first", RunStatus::Success);
        older.started_at -= Duration::seconds(10);
        store.record_run(&older).unwrap();
        store.record_run(&record("second", RunStatus::Failed)).unwrap();
        store.record_run(&record("third", RunStatus::Success)).unwrap();

        let runs = store.list_runs(2).unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].scope, "third");
        assert_eq!(runs[1].scope, "second");
    }
}
