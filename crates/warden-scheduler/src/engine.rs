use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use warden_store::Store;

use crate::registry::{AgentDef, Registry};
use crate::runner::{execute, TriggerKind};

/// Per-agent mutual exclusion: at most one execution of any agent in
/// flight, across scheduled ticks and one-shot requests alike.
#[derive(Debug, Default)]
pub struct RunGuard {
    active: Mutex<HashSet<String>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for an execution. `None` means a run is already in
    /// flight; the caller skips (scheduled tick) or reports busy (one-shot).
    pub fn try_acquire(self: &Arc<Self>, name: &str) -> Option<RunPermit> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(name.to_string()) {
            return None;
        }
        Some(RunPermit {
            guard: Arc::clone(self),
            name: name.to_string(),
        })
    }
}

/// RAII claim on an agent's execution slot, held for the whole invocation
/// including retries. Released on drop, even if the execution task panics.
pub struct RunPermit {
    guard: Arc<RunGuard>,
    name: String,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.active.lock().unwrap().remove(&self.name);
    }
}

/// An agent paired with its currently-computed next fire instant.
struct ScheduledEntry {
    agent: Arc<AgentDef>,
    next_fire: DateTime<Utc>,
}

/// The control loop: polls the entry list on a fixed short tick and
/// dispatches due agents onto their own blocking tasks.
pub struct Scheduler {
    registry: Arc<Registry>,
    store: Arc<Store>,
    guard: Arc<RunGuard>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<Store>,
        guard: Arc<RunGuard>,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            guard,
            tick,
        }
    }

    /// Main event loop. Polls until `shutdown` broadcasts `true`, then
    /// drains in-flight executions to completion before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let now = Utc::now();
        // Entries are rebuilt from the registry on every start: next fires
        // are computed from "now", so ticks missed while the process was
        // down are skipped, never replayed.
        let mut entries: Vec<ScheduledEntry> = self
            .registry
            .iter()
            .filter_map(|agent| {
                let rule = agent.rule()?;
                let next_fire = rule.next_fire(now)?;
                info!(
                    agent = %agent.name(),
                    schedule = %rule,
                    next = %next_fire.to_rfc3339(),
                    "agent scheduled"
                );
                Some(ScheduledEntry {
                    agent: Arc::clone(agent),
                    next_fire,
                })
            })
            .collect();
        info!(agents = entries.len(), "scheduler started");

        let mut interval = tokio::time::interval(self.tick);
        let mut running: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick_once(&mut entries, &mut running),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
                Some(res) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = res {
                        error!("execution task failed: {e}");
                    }
                }
            }
        }

        // Graceful drain: no new ticks, in-flight work runs to completion so
        // the store is never left with a half-written run.
        while let Some(res) = running.join_next().await {
            if let Err(e) = res {
                error!("execution task failed: {e}");
            }
        }
        info!("scheduler stopped");
    }

    fn tick_once(&self, entries: &mut Vec<ScheduledEntry>, running: &mut JoinSet<()>) {
        let now = Utc::now();
        entries.retain_mut(|entry| {
            if entry.next_fire > now {
                return true;
            }

            // Recompute from "now" before dispatch: a slow or failing run
            // must not stall this agent's cadence or anyone else's.
            let keep = match entry.agent.rule().and_then(|rule| rule.next_fire(now)) {
                Some(next_fire) => {
                    entry.next_fire = next_fire;
                    true
                }
                None => {
                    info!(agent = %entry.agent.name(), "no further occurrences; entry retired");
                    false
                }
            };

            match self.guard.try_acquire(entry.agent.name()) {
                Some(permit) => {
                    let agent = Arc::clone(&entry.agent);
                    let store = Arc::clone(&self.store);
                    running.spawn_blocking(move || {
                        let _permit = permit;
                        if let Err(e) = execute(&agent, &store, TriggerKind::Scheduled) {
                            error!(agent = %agent.name(), "execution failed: {e}");
                        }
                    });
                }
                // Skipped, not queued: observable in the log, no RunRecord.
                None => warn!(
                    agent = %entry.agent.name(),
                    "previous run still in flight; tick skipped"
                ),
            }

            keep
        });
    }
}
