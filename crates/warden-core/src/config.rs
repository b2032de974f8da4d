use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory.
pub const CONFIG_FILE: &str = "warden.toml";
/// Scheduler poll interval in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 500;

/// Top-level config (warden.toml + WARDEN_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Path of the embedded database file.
    #[serde(default = "default_db")]
    pub db: String,
    /// Default tracing filter level when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Scheduler poll interval in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            db: default_db(),
            log_level: default_log_level(),
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_db() -> String {
    "./warden.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

impl WardenConfig {
    /// Load config from a TOML file with WARDEN_* env var overrides.
    ///
    /// A missing file yields the defaults; a malformed file or override is a
    /// `Config` error surfaced before the scheduler starts.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or(CONFIG_FILE);

        let config: WardenConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("WARDEN_"))
            .extract()
            .map_err(|e| crate::error::WardenError::Config(e.to_string()))?;

        Ok(config)
    }
}
