use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Final status of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The work unit returned a value (or nothing) without raising.
    Success,
    /// The work unit returned an error or panicked; retries are driven by
    /// this status and the final exhausted attempt also carries it.
    Failure,
    /// The attempt itself ran into an infrastructure problem (e.g. the state
    /// flush could not be committed).
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
#[error("unknown run status: {0}")]
pub struct ParseStatusError(String);

impl std::str::FromStr for RunStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failure" => Ok(RunStatus::Failure),
            "error" => Ok(RunStatus::Error),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One finalized execution attempt's durable audit row.
///
/// Records are immutable once written: a retried agent produces a fresh
/// record per attempt (numbered from 1), never an edit of an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// UUIDv7 string — time-ordered, unique per attempt.
    pub id: String,
    /// Owning agent's name.
    pub agent: String,
    /// Attempt number within one logical invocation, starting at 1.
    pub attempt: u32,
    pub status: RunStatus,
    /// Value returned by the work unit, if any.
    pub result: Option<serde_json::Value>,
    /// Output captured from the run context during the attempt.
    pub output: Option<String>,
    /// Error detail when status is not `success`.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
}
