use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use progress_core::model::{Catalog, ContentId, LearningRecord, LearningType, ProgressState};
use progress_core::Clock;
use storage::{KeyValueStore, RemoteProgressStore, SnapshotStore};

use crate::calculator::{LastAccessed, ProgressCalculator};
use crate::cascade::{CascadeOutcome, CompletionCascade};
use crate::error::ProgressError;
use crate::reconciler::SyncReconciler;
use crate::session::SessionGate;
use crate::store::ProgressStore;

/// Assembles the progress engine and exposes the caller-facing surface.
///
/// The catalog is injected read-only; local persistence, the remote
/// store, and the session gate are supplied as trait objects so the
/// engine is testable with synthetic collaborators.
#[derive(Clone)]
pub struct ProgressEngine {
    catalog: Arc<Catalog>,
    store: Arc<ProgressStore>,
    calculator: ProgressCalculator,
    cascade: CompletionCascade,
    reconciler: SyncReconciler,
}

impl ProgressEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<Catalog>,
        kv: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteProgressStore>,
        session: Arc<dyn SessionGate>,
    ) -> Self {
        let store = Arc::new(ProgressStore::new(
            SnapshotStore::new(kv),
            Arc::clone(&remote),
            Arc::clone(&session),
        ));
        let calculator = ProgressCalculator::new(Arc::clone(&catalog));
        let cascade = CompletionCascade::new(clock, Arc::clone(&catalog), Arc::clone(&store));
        let reconciler = SyncReconciler::new(
            Arc::clone(&store),
            remote,
            session,
            cascade.clone(),
        );
        Self {
            catalog,
            store,
            calculator,
            cascade,
            reconciler,
        }
    }

    /// Run session-start reconciliation and record the landing page.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if local persistence fails.
    pub async fn initialize(&self, current_page: &ContentId) -> Result<(), ProgressError> {
        self.reconciler.initialize(current_page).await
    }

    /// Record that the learner opened a page.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if local persistence fails.
    pub async fn start_page(&self, page_id: &ContentId) -> Result<(), ProgressError> {
        self.cascade.start_page(page_id).await
    }

    /// Record that the learner finished a page and cascade completion.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if local persistence fails.
    pub async fn complete_page(&self, page_id: &ContentId) -> Result<CascadeOutcome, ProgressError> {
        self.cascade.complete_page(page_id).await
    }

    /// Whether the record at `(ty, id)` is marked complete.
    #[must_use]
    pub fn is_complete(&self, ty: LearningType, id: &ContentId) -> bool {
        self.store.record(ty, id).is_completed()
    }

    /// The most recently touched record of `ty` under `page_id`.
    #[must_use]
    pub fn last_accessed(&self, ty: LearningType, page_id: &ContentId) -> Option<LastAccessed> {
        self.calculator
            .last_accessed(&self.store.snapshot(), ty, page_id)
    }

    /// Time-weighted completion percentage for the module containing
    /// `page_id`, in `0..=100`.
    #[must_use]
    pub fn module_progress(&self, page_id: &ContentId) -> u8 {
        self.calculator
            .module_progress(&self.store.snapshot(), page_id)
    }

    /// All achievement records, keyed by achievement id.
    #[must_use]
    pub fn achievements(&self) -> BTreeMap<ContentId, LearningRecord> {
        self.store.records_of(LearningType::Achievements)
    }

    /// A single achievement record, if granted.
    #[must_use]
    pub fn achievement(&self, id: &ContentId) -> Option<LearningRecord> {
        let record = self.store.record(LearningType::Achievements, id);
        (record != LearningRecord::default()).then_some(record)
    }

    /// The next page in linear catalog order.
    #[must_use]
    pub fn next_page(&self, id: &ContentId) -> Option<ContentId> {
        self.catalog.next_page(id)
    }

    /// Tracks whose member list includes the module containing `id`.
    #[must_use]
    pub fn tracks_by_module(&self, id: &ContentId) -> Vec<ContentId> {
        match self.catalog.module_root(id) {
            Some(module_root) => self.catalog.tracks_containing(&module_root),
            None => Vec::new(),
        }
    }

    /// Observe every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.store.subscribe()
    }

    /// Direct access to the underlying store.
    #[must_use]
    pub fn store(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.store)
    }
}
