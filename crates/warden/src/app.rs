use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;
use warden_core::config::WardenConfig;
use warden_core::error::Result as CoreResult;
use warden_scheduler::{
    execute, AgentDef, Registry, RunGuard, Scheduler, SchedulerError, TriggerKind,
};
use warden_store::{RunRecord, Store};

/// The embedding program's entry point: owns the registry, the config, and
/// the shared run guard, and wires them into the scheduler or the one-shot
/// execution path.
pub struct App {
    config: WardenConfig,
    registry: Registry,
    guard: Arc<RunGuard>,
    store: Mutex<Option<Arc<Store>>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Build from `warden.toml` in the working directory (defaults when the
    /// file is missing, `ConfigError` when it is malformed).
    pub fn new() -> CoreResult<Self> {
        Ok(Self::with_config(WardenConfig::load(None)?))
    }

    pub fn with_config(config: WardenConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            guard: Arc::new(RunGuard::new()),
            store: Mutex::new(None),
        }
    }

    /// Register an agent. Duplicate names and invalid schedules fail here,
    /// before anything starts.
    pub fn register(&mut self, def: AgentDef) -> Result<&mut Self, SchedulerError> {
        self.registry.register(def)?;
        Ok(self)
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The shared store handle, opened lazily on first use so commands that
    /// never touch the database don't create the file.
    pub fn store(&self) -> Result<Arc<Store>, SchedulerError> {
        let mut slot = self.store.lock().unwrap();
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Store::open(&self.config.db)?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Run one agent immediately, bypassing its schedule. Observes the same
    /// per-agent exclusion as scheduled ticks: a concurrently-running
    /// invocation of the same agent yields `AgentBusy`.
    pub fn run_now(&self, name: &str) -> Result<RunRecord, SchedulerError> {
        let agent = self
            .registry
            .get(name)
            .ok_or_else(|| SchedulerError::AgentNotFound {
                name: name.to_string(),
            })?;
        let permit = self
            .guard
            .try_acquire(name)
            .ok_or_else(|| SchedulerError::AgentBusy {
                name: name.to_string(),
            })?;
        let store = self.store()?;
        let record = execute(agent, &store, TriggerKind::Manual);
        drop(permit);
        record
    }

    /// Run the scheduler until `shutdown` broadcasts `true`, then drain
    /// in-flight executions.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<(), SchedulerError> {
        let store = self.store()?;
        let scheduler = Scheduler::new(
            Arc::new(self.registry),
            store,
            Arc::clone(&self.guard),
            Duration::from_millis(self.config.tick_ms),
        );
        scheduler.run(shutdown).await;
        Ok(())
    }

    /// Run the scheduler until Ctrl-C.
    pub async fn start(self) -> Result<(), SchedulerError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut engine = tokio::spawn(self.serve(shutdown_rx));
        tokio::select! {
            // engine ended on its own, e.g. the store failed to open
            res = &mut engine => {
                return match res {
                    Ok(result) => result,
                    Err(_) => Ok(()),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; shutting down");
                let _ = shutdown_tx.send(true);
            }
        }
        match engine.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }
}
