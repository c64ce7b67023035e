use std::sync::Arc;
use tracing::{debug, warn};

use progress_core::model::ContentId;
use storage::RemoteProgressStore;

use crate::cascade::CompletionCascade;
use crate::error::ProgressError;
use crate::session::SessionGate;
use crate::store::ProgressStore;

/// Merges locally buffered progress with the remote record at session
/// start.
///
/// Runs once per session initialization. An anonymous session keeps its
/// local snapshot; a session that just gained authentication first
/// replays everything recorded while anonymous through the write path
/// (so the remote store receives it), then adopts the remote snapshot.
/// Network failure never blocks the learner: the local snapshot stands.
#[derive(Clone)]
pub struct SyncReconciler {
    store: Arc<ProgressStore>,
    remote: Arc<dyn RemoteProgressStore>,
    session: Arc<dyn SessionGate>,
    cascade: CompletionCascade,
}

impl SyncReconciler {
    #[must_use]
    pub fn new(
        store: Arc<ProgressStore>,
        remote: Arc<dyn RemoteProgressStore>,
        session: Arc<dyn SessionGate>,
        cascade: CompletionCascade,
    ) -> Self {
        Self {
            store,
            remote,
            session,
            cascade,
        }
    }

    /// Reconcile state for a new session and record the landing page as
    /// started.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if local persistence fails; remote
    /// failures degrade to the local snapshot.
    pub async fn initialize(&self, current_page: &ContentId) -> Result<(), ProgressError> {
        if !self.session.is_authenticated() {
            self.store.publish_current();
            return self.cascade.start_page(current_page).await;
        }

        if self.store.is_anonymous() {
            // first authenticated session after anonymous progress:
            // replay every buffered entry so the remote store catches up
            let local = self.store.snapshot();
            let mut replayed = 0usize;
            for (ty, id, record) in local.entries() {
                self.store.update(ty, id, record.to_patch()).await?;
                replayed += 1;
            }
            self.store.clear_anonymous()?;
            debug!(replayed, "replayed anonymous progress after sign-in");
        }

        match self.remote.fetch().await {
            Ok(remote_state) => {
                self.store.replace(remote_state)?;
            }
            Err(err) => {
                warn!(error = %err, "remote snapshot fetch failed; keeping local progress");
                self.store.publish_current();
            }
        }
        self.cascade.start_page(current_page).await
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{
        Catalog, ContentNode, LearningType, ProgressState, RecordPatch, MODULES_ROOT,
    };
    use progress_core::time::{fixed_clock, fixed_now};
    use storage::{InMemoryKeyValue, InMemoryRemoteStore, SnapshotStore};

    use crate::session::FixedSession;

    fn id(s: &str) -> ContentId {
        ContentId::new(s)
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::new(
            [
                ContentNode::new("module-x", Some(id(MODULES_ROOT)))
                    .with_children(vec![id("p1")]),
                ContentNode::new("p1", Some(id("module-x"))),
            ],
            [],
        ))
    }

    struct Fixture {
        reconciler: SyncReconciler,
        store: Arc<ProgressStore>,
        remote: InMemoryRemoteStore,
    }

    fn build(session: FixedSession, kv: InMemoryKeyValue, remote: InMemoryRemoteStore) -> Fixture {
        let session: Arc<dyn SessionGate> = Arc::new(session);
        let remote_dyn: Arc<dyn RemoteProgressStore> = Arc::new(remote.clone());
        let store = Arc::new(ProgressStore::new(
            SnapshotStore::new(Arc::new(kv)),
            Arc::clone(&remote_dyn),
            Arc::clone(&session),
        ));
        let cascade = CompletionCascade::new(fixed_clock(), catalog(), Arc::clone(&store));
        let reconciler =
            SyncReconciler::new(Arc::clone(&store), remote_dyn, session, cascade);
        Fixture {
            reconciler,
            store,
            remote,
        }
    }

    fn kv_with_local_progress() -> InMemoryKeyValue {
        let kv = InMemoryKeyValue::new();
        let snapshot = SnapshotStore::new(Arc::new(kv.clone()));
        let mut state = ProgressState::new();
        state.merge(LearningType::Units, id("p1"), &RecordPatch::completed(fixed_now()));
        snapshot.save(&state).unwrap();
        snapshot.set_anonymous(true).unwrap();
        kv
    }

    #[tokio::test]
    async fn anonymous_session_keeps_local_and_starts_page() {
        let fixture = build(
            FixedSession::anonymous(),
            kv_with_local_progress(),
            InMemoryRemoteStore::new(),
        );

        fixture.reconciler.initialize(&id("p1")).await.unwrap();

        assert!(fixture.remote.pushes().is_empty());
        assert!(fixture
            .store
            .record(LearningType::Units, &id("p1"))
            .is_completed());
        assert!(fixture
            .store
            .record(LearningType::Units, &id("p1"))
            .is_started());
    }

    #[tokio::test]
    async fn login_transition_replays_before_adopting_remote() {
        let remote = InMemoryRemoteStore::new();
        let fixture = build(
            FixedSession::authenticated(),
            kv_with_local_progress(),
            remote,
        );

        fixture.reconciler.initialize(&id("p1")).await.unwrap();

        // the buffered completion reached the remote store first
        let pushes = fixture.remote.pushes();
        assert!(!pushes.is_empty());
        assert_eq!(pushes[0].0, LearningType::Units);
        assert_eq!(pushes[0].1, id("p1"));
        assert_eq!(pushes[0].2.completed_at, Some(fixed_now()));

        // the anonymous marker is gone and the remote snapshot (which
        // now includes the replayed record) is adopted
        assert!(!fixture.store.is_anonymous());
        assert!(fixture
            .store
            .record(LearningType::Units, &id("p1"))
            .is_completed());
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_local() {
        let remote = InMemoryRemoteStore::new();
        let kv = kv_with_local_progress();
        // clear the anonymous flag: this is a returning authenticated
        // session, not a login transition
        SnapshotStore::new(Arc::new(kv.clone()))
            .set_anonymous(false)
            .unwrap();
        let fixture = build(FixedSession::authenticated(), kv, remote);
        fixture.remote.set_fail_requests(true);

        fixture.reconciler.initialize(&id("p1")).await.unwrap();

        // progress is not blocked by the failed fetch
        assert!(fixture
            .store
            .record(LearningType::Units, &id("p1"))
            .is_completed());
        assert!(fixture
            .store
            .record(LearningType::Units, &id("p1"))
            .is_started());
    }

    #[tokio::test]
    async fn returning_authenticated_session_adopts_remote_snapshot() {
        let mut remote_state = ProgressState::new();
        remote_state.merge(
            LearningType::Units,
            id("p1"),
            &RecordPatch::completed(fixed_now()),
        );
        let remote = InMemoryRemoteStore::with_state(remote_state);

        let fixture = build(FixedSession::authenticated(), InMemoryKeyValue::new(), remote);
        fixture.reconciler.initialize(&id("p1")).await.unwrap();

        let record = fixture.store.record(LearningType::Units, &id("p1"));
        assert!(record.is_completed());
        // no anonymous progress existed, so nothing was replayed
        assert!(fixture
            .remote
            .pushes()
            .iter()
            .all(|(_, _, patch)| patch.completed_at.is_none()));
    }
}
