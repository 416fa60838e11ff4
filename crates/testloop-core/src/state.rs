//! Session-scoped container for [`TestingState`].
//!
//! One store per session; there is no process-wide state. The repair loop is
//! the only writer (through [`SessionStateStore::mutate`]); everyone else
//! reads clones via [`SessionStateStore::snapshot`].

use std::sync::{Mutex, MutexGuard};

use crate::domain::config::AgentDefaults;
use crate::domain::error::Result;
use crate::domain::state::TestingState;

#[derive(Debug, Default)]
pub struct SessionStateStore {
    inner: Mutex<TestingState>,
}

impl SessionStateStore {
    /// Fresh store seeded from agent defaults.
    pub fn initialize(defaults: &AgentDefaults) -> Self {
        Self::from_state(TestingState::new(defaults))
    }

    pub fn from_state(state: TestingState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Apply `f` to the state under the lock and return its result.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut TestingState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> TestingState {
        self.lock().clone()
    }

    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    pub fn deserialize(raw: &str) -> Result<Self> {
        let state: TestingState = serde_json::from_str(raw)?;
        Ok(Self::from_state(state))
    }

    fn lock(&self) -> MutexGuard<'_, TestingState> {
        // Plain data: recover from poisoning.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::TestResult;
    use chrono::Utc;

    #[test]
    fn test_initialize_from_defaults() {
        let store = SessionStateStore::initialize(&AgentDefaults {
            max_auto_repairs: 3,
        });
        let state = store.snapshot();
        assert_eq!(state.max_auto_repairs, 3);
        assert_eq!(state.repair_count, 0);
    }

    #[test]
    fn test_mutate_returns_closure_value() {
        let store = SessionStateStore::initialize(&AgentDefaults::default());
        let count = store.mutate(|state| {
            state.repair_count += 1;
            state.repair_count
        });
        assert_eq!(count, 1);
        assert_eq!(store.snapshot().repair_count, 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = SessionStateStore::initialize(&AgentDefaults::default());
        let mut snap = store.snapshot();
        snap.repair_count = 42;
        assert_eq!(store.snapshot().repair_count, 0);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let now = Utc::now();
        let store = SessionStateStore::initialize(&AgentDefaults::default());
        store.mutate(|state| {
            state
                .test_results
                .insert("unit".into(), TestResult::failed(now, now, "boom"));
            state.repair_count = 2;
        });

        let raw = store.serialize().expect("serialize");
        let restored = SessionStateStore::deserialize(&raw).expect("deserialize");
        assert_eq!(restored.snapshot(), store.snapshot());
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(SessionStateStore::deserialize("not json").is_err());
    }
}
