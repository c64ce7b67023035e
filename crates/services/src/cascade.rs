use std::sync::Arc;

use progress_core::model::{
    Catalog, ContentId, LearningRecord, LearningType, RecordPatch, GRAND_OPENING,
};
use progress_core::Clock;

use crate::calculator::ProgressCalculator;
use crate::error::ProgressError;
use crate::store::ProgressStore;

//
// ─── CASCADE OUTCOME ───────────────────────────────────────────────────────────
//

/// What a `complete_page` cascade newly marked complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// The unit page whose completion triggered the cascade.
    pub unit: Option<ContentId>,
    /// The module newly marked complete, if the page finished it.
    pub module: Option<ContentId>,
    /// Tracks newly marked complete.
    pub tracks: Vec<ContentId>,
    /// Achievements newly granted.
    pub achievements: Vec<ContentId>,
}

impl CascadeOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unit.is_none()
            && self.module.is_none()
            && self.tracks.is_empty()
            && self.achievements.is_empty()
    }
}

//
// ─── COMPLETION CASCADE ────────────────────────────────────────────────────────
//

/// Propagates completion upward: unit → module → track → achievement.
///
/// Each record moves monotonically through untouched → started →
/// completed; no cascade step removes a completion. Stages run strictly
/// after the previous stage's write has settled locally, so each reads
/// the effects of the one before it.
#[derive(Clone)]
pub struct CompletionCascade {
    clock: Clock,
    catalog: Arc<Catalog>,
    calculator: ProgressCalculator,
    store: Arc<ProgressStore>,
}

impl CompletionCascade {
    #[must_use]
    pub fn new(clock: Clock, catalog: Arc<Catalog>, store: Arc<ProgressStore>) -> Self {
        let calculator = ProgressCalculator::new(Arc::clone(&catalog));
        Self {
            clock,
            catalog,
            calculator,
            store,
        }
    }

    /// Record that the learner opened a page.
    ///
    /// A module root page is simultaneously tracked as its own unit page;
    /// the two updates run as a concurrent join with no ordering
    /// guarantee between their completions.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if local persistence fails.
    pub async fn start_page(&self, page_id: &ContentId) -> Result<(), ProgressError> {
        let Some(ty) = self.calculator.classify(page_id) else {
            return Ok(());
        };
        let now = self.clock.now();

        if ty == LearningType::Modules {
            let (module, unit) = tokio::join!(
                self.store.update(ty, page_id, RecordPatch::started(now)),
                self.store
                    .update(LearningType::Units, page_id, RecordPatch::started(now)),
            );
            module?;
            unit?;
        } else {
            self.store.update(ty, page_id, RecordPatch::started(now)).await?;
        }
        Ok(())
    }

    /// Record that the learner finished a page and run the full cascade.
    ///
    /// Pages that classify as anything but `units`/`modules` are a no-op
    /// and return the empty outcome.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if local persistence fails.
    pub async fn complete_page(&self, page_id: &ContentId) -> Result<CascadeOutcome, ProgressError> {
        let ty = self.calculator.classify(page_id);
        if !matches!(ty, Some(LearningType::Units | LearningType::Modules)) {
            return Ok(CascadeOutcome::default());
        }

        let now = self.clock.now();
        self.store
            .update(LearningType::Units, page_id, RecordPatch::completed(now))
            .await?;

        let mut outcome = CascadeOutcome {
            unit: Some(page_id.clone()),
            ..CascadeOutcome::default()
        };
        outcome.module = self.complete_module(page_id).await?;
        outcome.tracks = self.complete_tracks().await?;
        outcome.achievements = self.award_achievements().await?;
        Ok(outcome)
    }

    /// Mark the page's module started, and completed once its progress
    /// reaches 100. No qualifying change → no write.
    pub async fn complete_module(
        &self,
        page_id: &ContentId,
    ) -> Result<Option<ContentId>, ProgressError> {
        let Some(module_id) = self.catalog.module_root(page_id) else {
            return Ok(None);
        };
        let now = self.clock.now();
        let snapshot = self.store.snapshot();
        let record = snapshot
            .record(LearningType::Modules, &module_id)
            .cloned()
            .unwrap_or_default();

        let mut patch = RecordPatch::default();
        if !record.is_started() {
            patch.started_at = Some(now);
        }
        let newly_completed = !record.is_completed()
            && self.calculator.module_progress(&snapshot, page_id) >= 100;
        if newly_completed {
            patch.completed_at = Some(now);
        }
        if patch.is_empty() {
            return Ok(None);
        }

        self.store
            .update(LearningType::Modules, &module_id, patch)
            .await?;
        Ok(newly_completed.then_some(module_id))
    }

    /// Mark every track whose member modules are all complete. Tracks
    /// already fully marked are left untouched.
    pub async fn complete_tracks(&self) -> Result<Vec<ContentId>, ProgressError> {
        let now = self.clock.now();
        let snapshot = self.store.snapshot();

        let mut newly_completed = Vec::new();
        let mut pending = Vec::new();
        for (track_id, modules) in self.catalog.tracks() {
            if modules.is_empty() {
                continue;
            }
            let all_done = modules.iter().all(|module| {
                snapshot
                    .record(LearningType::Modules, module)
                    .is_some_and(LearningRecord::is_completed)
            });
            if !all_done {
                continue;
            }

            let record = snapshot
                .record(LearningType::Tracks, track_id)
                .cloned()
                .unwrap_or_default();
            let mut patch = RecordPatch::default();
            if !record.is_started() {
                patch.started_at = Some(now);
            }
            if !record.is_completed() {
                patch.completed_at = Some(now);
                newly_completed.push(track_id.clone());
            }
            if !patch.is_empty() {
                pending.push((track_id.clone(), patch));
            }
        }

        for (track_id, patch) in pending {
            self.store
                .update(LearningType::Tracks, &track_id, patch)
                .await?;
        }
        Ok(newly_completed)
    }

    /// Grant `grand-opening` on the first completed module and one
    /// achievement per completed track. Presence in the achievements
    /// mapping is the idempotency guard.
    pub async fn award_achievements(&self) -> Result<Vec<ContentId>, ProgressError> {
        let now = self.clock.now();
        let snapshot = self.store.snapshot();
        let mut granted = Vec::new();

        let any_module_done = snapshot
            .records_of(LearningType::Modules)
            .any(|(_, record)| record.is_completed());
        let grand_opening = ContentId::new(GRAND_OPENING);
        if any_module_done && !snapshot.contains(LearningType::Achievements, &grand_opening) {
            self.store
                .update(
                    LearningType::Achievements,
                    &grand_opening,
                    RecordPatch::achievement("standard", now),
                )
                .await?;
            granted.push(grand_opening);
        }

        let completed_tracks: Vec<ContentId> = snapshot
            .records_of(LearningType::Tracks)
            .filter(|(_, record)| record.is_completed())
            .map(|(track_id, _)| track_id.clone())
            .collect();
        for track_id in completed_tracks {
            if snapshot.contains(LearningType::Achievements, &track_id) {
                continue;
            }
            self.store
                .update(
                    LearningType::Achievements,
                    &track_id,
                    RecordPatch::achievement("track", now),
                )
                .await?;
            granted.push(track_id);
        }
        Ok(granted)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
