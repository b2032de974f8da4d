use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::RunContext;
use crate::error::{Result, SchedulerError};
use crate::rule::ScheduleRule;

/// What one invocation of a work unit produces: an optional JSON result, or
/// an error that drives the retry policy.
pub type WorkResult = anyhow::Result<Option<serde_json::Value>>;

/// A unit of user-supplied work. Implemented for free by any matching
/// closure; invocations may block for arbitrary wall-clock time, so the
/// engine isolates each one on its own blocking task.
pub trait WorkUnit: Send + Sync {
    fn invoke(&self, ctx: &mut RunContext<'_>) -> WorkResult;
}

impl<F> WorkUnit for F
where
    F: Fn(&mut RunContext<'_>) -> WorkResult + Send + Sync,
{
    fn invoke(&self, ctx: &mut RunContext<'_>) -> WorkResult {
        self(ctx)
    }
}

/// A named, schedule-bound unit of work. Immutable once registered.
pub struct AgentDef {
    name: String,
    work: Arc<dyn WorkUnit>,
    rule: Option<ScheduleRule>,
    retries: u32,
    retry_delay: Duration,
}

impl AgentDef {
    /// An agent with no schedule — runnable only via the one-shot path.
    pub fn new(name: impl Into<String>, work: impl WorkUnit + 'static) -> Self {
        Self {
            name: name.into(),
            work: Arc::new(work),
            rule: None,
            retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn schedule(mut self, rule: ScheduleRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// How many times a failing invocation is retried (0 = single attempt).
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Fixed delay between attempts. Constant, so trivially non-decreasing.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self) -> Option<&ScheduleRule> {
        self.rule.as_ref()
    }

    pub fn max_retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn delay(&self) -> Duration {
        self.retry_delay
    }

    pub(crate) fn work(&self) -> &dyn WorkUnit {
        self.work.as_ref()
    }
}

impl fmt::Debug for AgentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDef")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// The set of registered agents. Built before the scheduler starts and
/// immutable for its lifetime.
#[derive(Debug, Default)]
pub struct Registry {
    agents: BTreeMap<String, Arc<AgentDef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Duplicate names and invalid schedules are fatal
    /// here so the scheduler never starts with a bad definition.
    pub fn register(&mut self, def: AgentDef) -> Result<()> {
        if let Some(rule) = def.rule() {
            rule.validate()?;
        }
        if self.agents.contains_key(def.name()) {
            return Err(SchedulerError::DuplicateAgent {
                name: def.name().to_string(),
            });
        }
        self.agents.insert(def.name().to_string(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<AgentDef>> {
        self.agents.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentDef>> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut RunContext<'_>) -> WorkResult {
        Ok(None)
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new();
        registry
            .register(AgentDef::new("ping", noop).schedule(ScheduleRule::every_seconds(5)))
            .unwrap();
        assert_eq!(registry.len(), 1);
        let agent = registry.get("ping").unwrap();
        assert_eq!(agent.name(), "ping");
        assert_eq!(agent.max_retries(), 0);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_name_is_fatal() {
        let mut registry = Registry::new();
        registry.register(AgentDef::new("ping", noop)).unwrap();
        let err = registry.register(AgentDef::new("ping", noop)).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateAgent { .. }));
    }

    #[test]
    fn zero_interval_rejected_at_registration() {
        let mut registry = Registry::new();
        let err = registry
            .register(AgentDef::new("bad", noop).schedule(ScheduleRule::every_seconds(0)))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }
}
