use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::db::init_db;
use crate::error::Result;
use crate::types::{RunRecord, RunStatus};

/// Thread-safe handle over the embedded database.
///
/// Wraps a single SQLite connection in a `Mutex`; statements and
/// transactions hold the lock only for their own duration, never across a
/// work-unit invocation. Open additional `Store`s on the same path (WAL
/// mode) when separate subsystems need their own connection.
pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and run schema init.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        debug!(path = %path.display(), "database opened");
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // --- run ledger --------------------------------------------------------

    /// Append one finalized run record. The single INSERT is atomic, so
    /// concurrent appends from parallel executions never interleave fields.
    pub fn append_run(&self, run: &RunRecord) -> Result<()> {
        let result = run
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO runs
             (id, agent, attempt, status, result, output, error,
              started_at, finished_at, duration_ms)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            rusqlite::params![
                run.id,
                run.agent,
                run.attempt,
                run.status.to_string(),
                result,
                run.output,
                run.error,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.duration_ms,
            ],
        )?;
        Ok(())
    }

    /// Most-recent-first records for one agent.
    pub fn recent_runs(&self, agent: &str, limit: u32) -> Result<Vec<RunRecord>> {
        self.query_runs(Some(agent), limit, 0)
    }

    /// Bounded-window ledger query, most-recent-first. `agent = None` spans
    /// every agent.
    pub fn query_runs(
        &self,
        agent: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RunRecord>> {
        let db = self.db.lock().unwrap();
        let mut runs = Vec::new();
        match agent {
            Some(name) => {
                let mut stmt = db.prepare_cached(
                    "SELECT id, agent, attempt, status, result, output, error,
                            started_at, finished_at, duration_ms
                     FROM runs WHERE agent = ?1
                     ORDER BY started_at DESC, id DESC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt.query_map(rusqlite::params![name, limit, offset], row_to_run)?;
                for row in rows {
                    runs.push(row?);
                }
            }
            None => {
                let mut stmt = db.prepare_cached(
                    "SELECT id, agent, attempt, status, result, output, error,
                            started_at, finished_at, duration_ms
                     FROM runs
                     ORDER BY started_at DESC, id DESC
                     LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit, offset], row_to_run)?;
                for row in rows {
                    runs.push(row?);
                }
            }
        }
        Ok(runs)
    }

    /// Look up a single record by run id.
    pub fn get_run(&self, id: &str) -> Result<Option<RunRecord>> {
        let db = self.db.lock().unwrap();
        let run = db
            .query_row(
                "SELECT id, agent, attempt, status, result, output, error,
                        started_at, finished_at, duration_ms
                 FROM runs WHERE id = ?1",
                [id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    // --- state store -------------------------------------------------------

    /// Read one value from an agent's namespace. The value is deserialized
    /// fresh on every call, so callers get their own copy.
    pub fn state_get(&self, agent: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let db = self.db.lock().unwrap();
        let raw: Option<String> = db
            .query_row(
                "SELECT value FROM state WHERE agent = ?1 AND key = ?2",
                [agent, key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Upsert one value in an agent's namespace (last-writer-wins).
    pub fn state_set(&self, agent: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO state (agent, key, value, updated_at) VALUES (?1,?2,?3,?4)
             ON CONFLICT(agent, key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            rusqlite::params![agent, key, raw, now],
        )?;
        Ok(())
    }

    /// Delete one key from an agent's namespace. Deleting a missing key is
    /// not an error.
    pub fn state_delete(&self, agent: &str, key: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM state WHERE agent = ?1 AND key = ?2",
            [agent, key],
        )?;
        Ok(())
    }

    /// All keys and values in an agent's namespace.
    pub fn state_all(&self, agent: &str) -> Result<BTreeMap<String, serde_json::Value>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached("SELECT key, value FROM state WHERE agent = ?1")?;
        let rows = stmt.query_map([agent], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut all = BTreeMap::new();
        for row in rows {
            let (key, raw) = row?;
            all.insert(key, serde_json::from_str(&raw)?);
        }
        Ok(all)
    }

    /// Apply a buffered batch of writes and deletes in one transaction —
    /// either every change commits or none does.
    pub fn state_apply(
        &self,
        agent: &str,
        dirty: &HashMap<String, serde_json::Value>,
        deleted: &HashSet<String>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        for key in deleted {
            tx.execute(
                "DELETE FROM state WHERE agent = ?1 AND key = ?2",
                [agent, key.as_str()],
            )?;
        }
        for (key, value) in dirty {
            let raw = serde_json::to_string(value)?;
            tx.execute(
                "INSERT INTO state (agent, key, value, updated_at) VALUES (?1,?2,?3,?4)
                 ON CONFLICT(agent, key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                rusqlite::params![agent, key, raw, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let status_str: String = row.get(3)?;
    let status: RunStatus = status_str
        .parse()
        .map_err(|e| conversion_err(3, Box::new(e)))?;
    let result: Option<String> = row.get(4)?;
    let result = result
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_err(4, Box::new(e)))?;
    Ok(RunRecord {
        id: row.get(0)?,
        agent: row.get(1)?,
        attempt: row.get(2)?,
        status,
        result,
        output: row.get(5)?,
        error: row.get(6)?,
        started_at: parse_instant(row, 7)?,
        finished_at: parse_instant(row, 8)?,
        duration_ms: row.get(9)?,
    })
}

fn parse_instant(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, Box::new(e)))
}

fn conversion_err(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}
