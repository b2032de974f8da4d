use thiserror::Error;

/// Errors surfaced before the scheduler starts. Everything raised at
/// runtime lives in the store and scheduler crates' own error types.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WardenError>;
