use rusqlite::Connection;

use crate::error::Result;

/// Initialise the warden schema in `conn`. Safe to call on every startup
/// (idempotent, `IF NOT EXISTS` throughout).
///
/// The `(agent, started_at DESC)` index keeps the history view cheap: both
/// the per-agent ledger query and the last-10-runs context snapshot walk it.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id          TEXT    NOT NULL PRIMARY KEY,
            agent       TEXT    NOT NULL,
            attempt     INTEGER NOT NULL DEFAULT 1,
            status      TEXT    NOT NULL,
            result      TEXT,               -- JSON or NULL
            output      TEXT,               -- captured output or NULL
            error       TEXT,               -- error detail or NULL
            started_at  TEXT    NOT NULL,   -- RFC 3339
            finished_at TEXT    NOT NULL,   -- RFC 3339
            duration_ms REAL    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_runs_agent ON runs (agent, started_at DESC);

        CREATE TABLE IF NOT EXISTS state (
            agent       TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,      -- JSON
            updated_at  TEXT NOT NULL,      -- RFC 3339
            PRIMARY KEY (agent, key)
        ) STRICT;
        ",
    )?;
    Ok(())
}
