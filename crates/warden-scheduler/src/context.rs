use tracing::info;
use warden_store::{RunRecord, ScopedState};

/// Everything a work unit may touch during one attempt.
///
/// The state handle and history snapshot are shared across an invocation's
/// retry attempts; the run id, attempt number, and output buffer are fresh
/// per attempt. History reflects runs that finished before this logical
/// invocation started — an agent never sees its own in-flight failures.
pub struct RunContext<'a> {
    agent_name: &'a str,
    run_id: String,
    attempt: u32,
    history: &'a [RunRecord],
    state: &'a mut ScopedState,
    output: String,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        agent_name: &'a str,
        run_id: String,
        attempt: u32,
        history: &'a [RunRecord],
        state: &'a mut ScopedState,
    ) -> Self {
        Self {
            agent_name,
            run_id,
            attempt,
            history,
            state,
            output: String::new(),
        }
    }

    pub fn agent_name(&self) -> &str {
        self.agent_name
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Attempt number within this logical invocation, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Up to the last 10 finalized runs of this agent, most-recent-first.
    pub fn history(&self) -> &[RunRecord] {
        self.history
    }

    /// This agent's persistent key-value namespace. Writes become durable
    /// when the invocation's context is torn down.
    pub fn state(&mut self) -> &mut ScopedState {
        self.state
    }

    /// Emit a line of output: forwarded live through `tracing` and buffered
    /// into this attempt's run record.
    pub fn log(&mut self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        info!(agent = %self.agent_name, run_id = %self.run_id, "{msg}");
        self.output.push_str(msg);
        self.output.push('\n');
    }

    /// Consume the context, yielding the captured output (None when empty).
    pub(crate) fn into_output(self) -> Option<String> {
        if self.output.is_empty() {
            None
        } else {
            Some(self.output)
        }
    }
}
