use thiserror::Error;

/// Errors from the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The schedule rule is malformed (bad cron expression, zero-length
    /// interval, unparseable HH:MM). Raised at registration, never at fire
    /// time.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// An agent with this name is already registered.
    #[error("Duplicate agent name: {name}")]
    DuplicateAgent { name: String },

    /// No agent with this name exists in the registry.
    #[error("Agent not found: {name}")]
    AgentNotFound { name: String },

    /// The agent already has an execution in flight.
    #[error("Agent busy: {name} is already running")]
    AgentBusy { name: String },

    /// Underlying persistence failure.
    #[error("Storage error: {0}")]
    Store(#[from] warden_store::StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
