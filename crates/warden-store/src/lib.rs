//! `warden-store` — run ledger and per-agent state over a single SQLite file.
//!
//! Two tables share one embedded database:
//!
//! | Table   | Contents                                            |
//! |---------|-----------------------------------------------------|
//! | `runs`  | One finalized [`RunRecord`] per execution attempt   |
//! | `state` | `(agent, key) → JSON value`, last-writer-wins       |
//!
//! The ledger is append-only: records are written once, finalized, and never
//! edited. State writes made through [`ScopedState`] are buffered and become
//! durable in a single transaction when the owning run's context is torn
//! down, so a concurrent reader never observes a half-written run.

pub mod db;
pub mod error;
pub mod scoped;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use scoped::ScopedState;
pub use store::Store;
pub use types::{RunRecord, RunStatus};
