use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use progress_core::model::{ContentId, LearningType, ProgressState, RecordPatch};

/// Errors surfaced by the remote progress store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// The session is no longer valid on the remote side.
    #[error("remote rejected the session")]
    Unauthorized,

    #[error("remote request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Remote progress record: full snapshot reads, partial-merge writes.
///
/// `push` carries exactly one `(type, id, fields)` fragment; the remote
/// side merges it into its copy of the snapshot. The push response body is
/// never consumed — local state stays authoritative.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// Fetch the full remote snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Unauthorized` on a rejected session, or other
    /// transport failures.
    async fn fetch(&self) -> Result<ProgressState, RemoteError>;

    /// Apply one partial record update remotely.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Unauthorized` on a rejected session, or other
    /// transport failures.
    async fn push(
        &self,
        ty: LearningType,
        id: &ContentId,
        patch: &RecordPatch,
    ) -> Result<(), RemoteError>;
}

/// In-memory remote store for testing and prototyping.
///
/// Applies pushes with the same partial-merge semantics as the real
/// endpoint and records them for inspection. Failure modes are switchable
/// to exercise the fallback paths.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<ProgressState>>,
    pushes: Arc<Mutex<Vec<(LearningType, ContentId, RecordPatch)>>>,
    fail_requests: Arc<AtomicBool>,
    unauthorized: Arc<AtomicBool>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the remote side with an existing snapshot.
    #[must_use]
    pub fn with_state(state: ProgressState) -> Self {
        let store = Self::default();
        *store.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        store
    }

    /// Make every request fail with a transport error.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Make every request fail as unauthorized.
    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    /// Every push received so far, in arrival order.
    #[must_use]
    pub fn pushes(&self) -> Vec<(LearningType, ContentId, RecordPatch)> {
        self.pushes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The remote side's current snapshot.
    #[must_use]
    pub fn state(&self) -> ProgressState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check_failures(&self) -> Result<(), RemoteError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized);
        }
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(RemoteError::HttpStatus(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteProgressStore for InMemoryRemoteStore {
    async fn fetch(&self) -> Result<ProgressState, RemoteError> {
        self.check_failures()?;
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn push(
        &self,
        ty: LearningType,
        id: &ContentId,
        patch: &RecordPatch,
    ) -> Result<(), RemoteError> {
        self.check_failures()?;
        self.pushes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((ty, id.clone(), patch.clone()));
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .merge(ty, id.clone(), patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_now;

    #[tokio::test]
    async fn pushes_merge_into_remote_state() {
        let remote = InMemoryRemoteStore::new();
        let id = ContentId::new("page-1");

        remote
            .push(LearningType::Units, &id, &RecordPatch::started(fixed_now()))
            .await
            .unwrap();
        remote
            .push(LearningType::Units, &id, &RecordPatch::completed(fixed_now()))
            .await
            .unwrap();

        let state = remote.fetch().await.unwrap();
        let record = state.record(LearningType::Units, &id).unwrap();
        assert!(record.is_started());
        assert!(record.is_completed());
        assert_eq!(remote.pushes().len(), 2);
    }

    #[tokio::test]
    async fn failure_modes_surface_as_errors() {
        let remote = InMemoryRemoteStore::new();
        remote.set_fail_requests(true);
        assert!(matches!(
            remote.fetch().await,
            Err(RemoteError::HttpStatus(_))
        ));

        remote.set_fail_requests(false);
        remote.set_unauthorized(true);
        assert!(matches!(
            remote
                .push(
                    LearningType::Units,
                    &ContentId::new("page-1"),
                    &RecordPatch::started(fixed_now()),
                )
                .await,
            Err(RemoteError::Unauthorized)
        ));
    }
}
