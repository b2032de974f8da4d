//! `warden-core` — configuration and shared error types.

pub mod config;
pub mod error;

pub use config::WardenConfig;
pub use error::{Result, WardenError};
