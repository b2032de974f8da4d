use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;

/// Key-value view scoped to one agent's namespace, buffered until teardown.
///
/// Lazy-loads the full namespace on first access. Reads are served from the
/// in-memory copy (cloned out, so callers can't mutate stored state without
/// going through [`set`](Self::set)); writes and deletes are tracked and made
/// durable in a single transaction by [`flush`](Self::flush). Until then, no
/// other connection observes any of this run's writes.
pub struct ScopedState {
    store: Arc<Store>,
    agent: String,
    cache: Option<BTreeMap<String, serde_json::Value>>,
    dirty: HashMap<String, serde_json::Value>,
    deleted: HashSet<String>,
}

impl ScopedState {
    pub fn new(store: Arc<Store>, agent: impl Into<String>) -> Self {
        Self {
            store,
            agent: agent.into(),
            cache: None,
            dirty: HashMap::new(),
            deleted: HashSet::new(),
        }
    }

    fn load(&mut self) -> Result<&mut BTreeMap<String, serde_json::Value>> {
        if self.cache.is_none() {
            self.cache = Some(self.store.state_all(&self.agent)?);
        }
        Ok(self.cache.get_or_insert_with(BTreeMap::new))
    }

    /// Read one key. Returns a copy of the stored value.
    pub fn get(&mut self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.load()?.get(key).cloned())
    }

    /// Write one key. Durable at flush, visible to this context immediately.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let key = key.into();
        self.load()?.insert(key.clone(), value.clone());
        self.deleted.remove(&key);
        self.dirty.insert(key, value);
        Ok(())
    }

    /// Delete one key. Deleting a missing key is a no-op.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.load()?.remove(key);
        self.dirty.remove(key);
        self.deleted.insert(key.to_string());
        Ok(())
    }

    /// Snapshot of the whole namespace as this context sees it.
    pub fn all(&mut self) -> Result<BTreeMap<String, serde_json::Value>> {
        Ok(self.load()?.clone())
    }

    /// Commit buffered writes and deletes in one transaction.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty.is_empty() && self.deleted.is_empty() {
            return Ok(());
        }
        self.store
            .state_apply(&self.agent, &self.dirty, &self.deleted)?;
        self.dirty.clear();
        self.deleted.clear();
        Ok(())
    }
}
