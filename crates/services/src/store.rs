use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::warn;

use progress_core::model::{ContentId, LearningRecord, LearningType, ProgressState, RecordPatch};
use storage::{RemoteError, RemoteProgressStore, SnapshotStore};

use crate::error::ProgressError;
use crate::session::SessionGate;

//
// ─── PROGRESS STORE ────────────────────────────────────────────────────────────
//

/// State container for learner progress.
///
/// Holds the in-memory `ProgressState` (the single source of truth),
/// mirrors it wholesale to local storage on every mutation, publishes
/// every new snapshot to subscribers, and forwards each change to the
/// remote store when the session is authenticated.
///
/// The in-memory merge, local persist, and publish all happen before any
/// remote request is dispatched, so a read issued right after `update`
/// observes the new value even while the network round trip is pending.
pub struct ProgressStore {
    state: Mutex<ProgressState>,
    local: SnapshotStore,
    remote: Arc<dyn RemoteProgressStore>,
    session: Arc<dyn SessionGate>,
    publisher: watch::Sender<ProgressState>,
}

impl ProgressStore {
    /// Build the store, rehydrating the in-memory state from local storage.
    #[must_use]
    pub fn new(
        local: SnapshotStore,
        remote: Arc<dyn RemoteProgressStore>,
        session: Arc<dyn SessionGate>,
    ) -> Self {
        let state = local.load();
        let (publisher, _) = watch::channel(state.clone());
        Self {
            state: Mutex::new(state),
            local,
            remote,
            session,
            publisher,
        }
    }

    /// Merge `patch` into the record at `(ty, id)` and propagate.
    ///
    /// Locally: merge, persist the full snapshot, publish. Remotely (only
    /// when authenticated): issue the partial update; on any outcome the
    /// local snapshot is republished so observers always see the
    /// locally-applied change. A rejected session triggers sign-out.
    /// Remote failures are logged, never retried, never returned.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the local snapshot cannot be
    /// persisted.
    pub async fn update(
        &self,
        ty: LearningType,
        id: &ContentId,
        patch: RecordPatch,
    ) -> Result<(), ProgressError> {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.merge(ty, id.clone(), &patch);
            state.clone()
        };
        self.local.save(&snapshot)?;
        if !self.session.is_authenticated() {
            // progress buffered locally until the learner signs in
            self.local.set_anonymous(true)?;
        }
        self.publisher.send_replace(snapshot);

        if self.session.is_authenticated() {
            match self.remote.push(ty, id, &patch).await {
                Ok(()) => {}
                Err(RemoteError::Unauthorized) => {
                    warn!(%id, "remote rejected session; signing out");
                    self.session.sign_out();
                }
                Err(err) => {
                    warn!(%id, error = %err, "remote progress update failed");
                }
            }
            // republish regardless of outcome so observers never stall
            self.publish_current();
        }

        Ok(())
    }

    /// Replace the whole state (remote snapshot adoption): persist and
    /// publish the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the snapshot cannot be persisted.
    pub fn replace(&self, state: ProgressState) -> Result<(), ProgressError> {
        {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *guard = state.clone();
        }
        self.local.save(&state)?;
        self.publisher.send_replace(state);
        Ok(())
    }

    /// Re-send the current snapshot to subscribers.
    pub fn publish_current(&self) {
        let snapshot = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.publisher.send_replace(snapshot);
    }

    /// The full current state.
    #[must_use]
    pub fn snapshot(&self) -> ProgressState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The record at `(ty, id)`; an empty record if absent.
    #[must_use]
    pub fn record(&self, ty: LearningType, id: &ContentId) -> LearningRecord {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(ty, id)
            .cloned()
            .unwrap_or_default()
    }

    /// All records of one type, in id order.
    #[must_use]
    pub fn records_of(&self, ty: LearningType) -> BTreeMap<ContentId, LearningRecord> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records_of(ty)
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Records of one type whose id is `page` or one of its sub-pages.
    #[must_use]
    pub fn records_matching(
        &self,
        ty: LearningType,
        page: &ContentId,
    ) -> Vec<(ContentId, LearningRecord)> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .matching_prefix(ty, page)
            .into_iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Observe every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.publisher.subscribe()
    }

    /// True when local progress was recorded unauthenticated.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.local.is_anonymous()
    }

    /// Clear the anonymous-progress marker after reconciliation.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the marker cannot be written.
    pub fn clear_anonymous(&self) -> Result<(), ProgressError> {
        Ok(self.local.set_anonymous(false)?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_now;
    use storage::{InMemoryKeyValue, InMemoryRemoteStore};

    use crate::session::FixedSession;

    fn build_store(
        session: FixedSession,
    ) -> (Arc<ProgressStore>, InMemoryRemoteStore, Arc<FixedSession>) {
        let remote = InMemoryRemoteStore::new();
        let session = Arc::new(session);
        let store = ProgressStore::new(
            SnapshotStore::new(Arc::new(InMemoryKeyValue::new())),
            Arc::new(remote.clone()),
            Arc::clone(&session) as Arc<dyn SessionGate>,
        );
        (Arc::new(store), remote, session)
    }

    fn id(s: &str) -> ContentId {
        ContentId::new(s)
    }

    #[tokio::test]
    async fn unauthenticated_update_stays_local() {
        let (store, remote, _session) = build_store(FixedSession::anonymous());

        store
            .update(LearningType::Units, &id("page-1"), RecordPatch::started(fixed_now()))
            .await
            .unwrap();

        assert!(store.record(LearningType::Units, &id("page-1")).is_started());
        assert!(remote.pushes().is_empty());
        assert!(store.is_anonymous());
    }

    #[tokio::test]
    async fn authenticated_update_pushes_fragment() {
        let (store, remote, _session) = build_store(FixedSession::authenticated());

        store
            .update(LearningType::Units, &id("page-1"), RecordPatch::completed(fixed_now()))
            .await
            .unwrap();

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, LearningType::Units);
        assert_eq!(pushes[0].1, id("page-1"));
        assert_eq!(pushes[0].2, RecordPatch::completed(fixed_now()));
        assert!(!store.is_anonymous());
    }

    #[tokio::test]
    async fn remote_failure_keeps_local_state_authoritative() {
        let (store, remote, _session) = build_store(FixedSession::authenticated());
        remote.set_fail_requests(true);

        let mut observer = store.subscribe();
        store
            .update(LearningType::Units, &id("page-1"), RecordPatch::started(fixed_now()))
            .await
            .unwrap();

        assert!(store.record(LearningType::Units, &id("page-1")).is_started());
        // the failed round trip still republished the local snapshot
        assert!(observer
            .borrow_and_update()
            .record(LearningType::Units, &id("page-1"))
            .is_some());
    }

    #[tokio::test]
    async fn unauthorized_remote_signs_out() {
        let (store, remote, session) = build_store(FixedSession::authenticated());
        remote.set_unauthorized(true);

        store
            .update(LearningType::Units, &id("page-1"), RecordPatch::started(fixed_now()))
            .await
            .unwrap();

        assert!(session.was_signed_out());
        assert!(store.record(LearningType::Units, &id("page-1")).is_started());
    }

    #[tokio::test]
    async fn read_after_update_observes_merge() {
        let (store, _remote, _session) = build_store(FixedSession::anonymous());
        let now = fixed_now();

        store
            .update(LearningType::Units, &id("page-1"), RecordPatch::started(now))
            .await
            .unwrap();
        store
            .update(LearningType::Units, &id("page-1"), RecordPatch::completed(now))
            .await
            .unwrap();

        let record = store.record(LearningType::Units, &id("page-1"));
        assert_eq!(record.started_at, Some(now));
        assert_eq!(record.completed_at, Some(now));

        // absent records read as empty, not missing
        let absent = store.record(LearningType::Units, &id("page-9"));
        assert_eq!(absent, LearningRecord::default());
    }

    #[tokio::test]
    async fn replace_adopts_snapshot_wholesale() {
        let (store, _remote, _session) = build_store(FixedSession::anonymous());
        store
            .update(LearningType::Units, &id("old"), RecordPatch::started(fixed_now()))
            .await
            .unwrap();

        let mut incoming = ProgressState::new();
        incoming.merge(LearningType::Units, id("new"), &RecordPatch::completed(fixed_now()));
        store.replace(incoming.clone()).unwrap();

        assert_eq!(store.snapshot(), incoming);
        assert_eq!(store.record(LearningType::Units, &id("old")), LearningRecord::default());
    }
}
