use std::sync::Arc;
use tracing::debug;

use progress_core::model::ProgressState;

use crate::repository::{KeyValueStore, StorageError};

/// Key under which the full progress snapshot is stored.
pub const SNAPSHOT_KEY: &str = "progress.snapshot";

/// Key under which the anonymous-progress marker is stored.
pub const ANONYMOUS_KEY: &str = "progress.anonymous";

/// Local snapshot persistence over a [`KeyValueStore`].
///
/// The snapshot occupies a single key and is replaced wholesale on every
/// write. A sibling key marks progress recorded while unauthenticated, so
/// reconciliation can tell a fresh login from a returning session.
#[derive(Clone)]
pub struct SnapshotStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the persisted snapshot.
    ///
    /// Missing or malformed payloads recover silently to the empty state.
    #[must_use]
    pub fn load(&self) -> ProgressState {
        let raw = match self.kv.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ProgressState::new(),
            Err(err) => {
                debug!(error = %err, "snapshot read failed; starting empty");
                return ProgressState::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                debug!(error = %err, "malformed snapshot payload; starting empty");
                ProgressState::new()
            }
        }
    }

    /// Persist the full snapshot, replacing the previous payload.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the key-value write fails.
    pub fn save(&self, state: &ProgressState) -> Result<(), StorageError> {
        let raw = serde_json::to_string(state)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.kv.set(SNAPSHOT_KEY, &raw)
    }

    /// True when the persisted progress was recorded unauthenticated.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self.kv.get(ANONYMOUS_KEY), Ok(Some(v)) if v == "true")
    }

    /// Set or clear the anonymous-progress marker.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the key-value write fails.
    pub fn set_anonymous(&self, anonymous: bool) -> Result<(), StorageError> {
        if anonymous {
            self.kv.set(ANONYMOUS_KEY, "true")
        } else {
            self.kv.remove(ANONYMOUS_KEY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{ContentId, LearningType, RecordPatch};
    use progress_core::time::fixed_now;

    use crate::repository::InMemoryKeyValue;

    fn store_with_kv() -> (SnapshotStore, InMemoryKeyValue) {
        let kv = InMemoryKeyValue::new();
        (SnapshotStore::new(Arc::new(kv.clone())), kv)
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let (store, _kv) = store_with_kv();
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_snapshot_loads_empty() {
        let (store, kv) = store_with_kv();
        kv.set(SNAPSHOT_KEY, "][ definitely not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn snapshot_round_trips() {
        let (store, _kv) = store_with_kv();
        let mut state = ProgressState::new();
        state.merge(
            LearningType::Units,
            ContentId::new("page-1"),
            &RecordPatch::completed(fixed_now()),
        );

        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn anonymous_marker_toggles() {
        let (store, _kv) = store_with_kv();
        assert!(!store.is_anonymous());

        store.set_anonymous(true).unwrap();
        assert!(store.is_anonymous());

        store.set_anonymous(false).unwrap();
        assert!(!store.is_anonymous());
    }
}
