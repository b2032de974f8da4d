//! `warden` — schedule, run, and track agents with zero infra.
//!
//! An agent is a named work function bound to a time rule, a retry limit,
//! and a persistent key-value namespace. All durable state (run history and
//! agent state) lives in one embedded SQLite file; registration is rebuilt
//! by the embedding program on every start.
//!
//! ```no_run
//! use warden::{AgentDef, App, RunContext, ScheduleRule, WorkResult};
//!
//! fn main() -> std::process::ExitCode {
//!     let mut app = App::new().expect("config");
//!     app.register(
//!         AgentDef::new("ping", |ctx: &mut RunContext<'_>| -> WorkResult {
//!             ctx.log("checking in");
//!             Ok(Some(serde_json::json!("ok")))
//!         })
//!         .schedule(ScheduleRule::every_minutes(5))
//!         .retries(2),
//!     )
//!     .expect("register");
//!     warden::cli::run(app)
//! }
//! ```

mod app;
pub mod cli;

pub use app::App;
pub use warden_core::config::WardenConfig;
pub use warden_core::error::WardenError;
pub use warden_scheduler::{
    AgentDef, Registry, RunContext, RunGuard, ScheduleRule, Scheduler, SchedulerError,
    TriggerKind, WorkResult, WorkUnit,
};
pub use warden_store::{RunRecord, RunStatus, ScopedState, Store, StoreError};
