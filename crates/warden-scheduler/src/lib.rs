//! `warden-scheduler` — time rules, agent registry, and the execution engine.
//!
//! # Overview
//!
//! Agents are registered in-memory before the engine starts (nothing about
//! the registry is persisted). The [`engine::Scheduler`] polls its entry
//! list on a short fixed tick and dispatches every due agent to the
//! execution wrapper on its own blocking task, recomputing the entry's next
//! fire time from "now" before dispatch so a slow run never stalls the
//! cadence. A per-agent run guard keeps at most one execution of any agent
//! in flight; a due tick that finds its agent busy is skipped, not queued.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                              |
//! |------------|--------------------------------------------------------|
//! | `Interval` | Repeat a fixed duration after each fire (drift-free)   |
//! | `Daily`    | Fire at HH:MM local time every day                     |
//! | `Weekly`   | Fire at HH:MM local time on a specific weekday         |
//! | `Cron`     | 5-field cron expression, validated at construction     |

pub mod context;
pub mod engine;
pub mod error;
pub mod registry;
pub mod rule;
pub mod runner;

pub use context::RunContext;
pub use engine::{RunGuard, Scheduler};
pub use error::{Result, SchedulerError};
pub use registry::{AgentDef, Registry, WorkResult, WorkUnit};
pub use rule::ScheduleRule;
pub use runner::{execute, TriggerKind, HISTORY_LIMIT};
