use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_store::{RunRecord, RunStatus, ScopedState, Store};

use crate::context::RunContext;
use crate::error::Result;
use crate::registry::AgentDef;

/// How many finalized runs the context's history view exposes.
pub const HISTORY_LIMIT: u32 = 10;

/// What caused an execution: a due schedule tick or an explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Scheduled => write!(f, "scheduled"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

/// Run one logical invocation of `agent`: the initial attempt plus up to
/// `retries` re-invocations, each producing its own finalized [`RunRecord`].
/// Returns the final attempt's record.
///
/// The caller holds the agent's run permit for the whole call, so two
/// invocations of the same agent never overlap. Errors and panics raised by
/// the work unit are contained here; only a failure to read the history
/// snapshot up front propagates out.
pub fn execute(agent: &AgentDef, store: &Arc<Store>, trigger: TriggerKind) -> Result<RunRecord> {
    // Snapshot before attempt 1: retries within this invocation all see the
    // same view and never their own failed attempts.
    let history = store.recent_runs(agent.name(), HISTORY_LIMIT)?;
    let mut state = ScopedState::new(Arc::clone(store), agent.name());
    let attempts = agent.max_retries() + 1;
    let mut attempt = 1u32;

    loop {
        let run_id = Uuid::now_v7().to_string();
        let started_at = Utc::now();
        info!(agent = %agent.name(), run_id = %run_id, attempt, %trigger, "agent starting");

        let mut ctx = RunContext::new(agent.name(), run_id.clone(), attempt, &history, &mut state);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| agent.work().invoke(&mut ctx)));
        let output = ctx.into_output();
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let (mut status, result, mut error) = match outcome {
            Ok(Ok(value)) => (RunStatus::Success, value, None),
            Ok(Err(e)) => (RunStatus::Failure, None, Some(format!("{e:#}"))),
            Err(payload) => (RunStatus::Failure, None, Some(panic_message(&payload))),
        };

        let last = status == RunStatus::Success || attempt >= attempts;
        if last {
            // Context teardown: buffered state must be durable before the
            // final record lands and control returns to the caller.
            if let Err(e) = state.flush() {
                error!(agent = %agent.name(), run_id = %run_id, "state flush failed: {e}");
                status = RunStatus::Error;
                error = Some(format!("state flush failed: {e}"));
            }
        }

        let record = RunRecord {
            id: run_id,
            agent: agent.name().to_string(),
            attempt,
            status,
            result,
            output,
            error,
            started_at,
            finished_at,
            duration_ms,
        };

        // Best-effort ledger write: a persistence hiccup must never take
        // down the control loop or swallow remaining retries.
        if let Err(e) = store.append_run(&record) {
            error!(agent = %agent.name(), run_id = %record.id, "run record write failed: {e}");
        }

        if last {
            info!(
                agent = %agent.name(),
                run_id = %record.id,
                status = %record.status,
                duration_ms = record.duration_ms as u64,
                "agent finished"
            );
            return Ok(record);
        }

        warn!(
            agent = %agent.name(),
            attempt,
            error = record.error.as_deref().unwrap_or(""),
            "attempt failed; retrying"
        );
        if !agent.delay().is_zero() {
            std::thread::sleep(agent.delay());
        }
        attempt += 1;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: unknown payload".to_string()
    }
}
