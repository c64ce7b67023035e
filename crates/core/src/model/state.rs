use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::ContentId;
use crate::model::record::{LearningRecord, LearningType, RecordPatch};

/// The full progress snapshot: one record map per learning type.
///
/// This is the single source of truth held in memory, mirrored wholesale
/// to local storage on every mutation, and the wire shape of the remote
/// snapshot (`{ "<type>": { "<id>": { fields } } }`). Ordered maps keep
/// the persisted form byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressState {
    records: BTreeMap<LearningType, BTreeMap<ContentId, LearningRecord>>,
}

impl ProgressState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.values().all(BTreeMap::is_empty)
    }

    /// The record at `(ty, id)`, if present.
    #[must_use]
    pub fn record(&self, ty: LearningType, id: &ContentId) -> Option<&LearningRecord> {
        self.records.get(&ty)?.get(id)
    }

    #[must_use]
    pub fn contains(&self, ty: LearningType, id: &ContentId) -> bool {
        self.record(ty, id).is_some()
    }

    /// All records of one type, in id order.
    pub fn records_of(
        &self,
        ty: LearningType,
    ) -> impl Iterator<Item = (&ContentId, &LearningRecord)> {
        self.records.get(&ty).into_iter().flatten()
    }

    /// Records of one type whose id is `page` or a `page/<suffix>` sub-page.
    #[must_use]
    pub fn matching_prefix(
        &self,
        ty: LearningType,
        page: &ContentId,
    ) -> Vec<(&ContentId, &LearningRecord)> {
        self.records_of(ty)
            .filter(|(id, _)| id.is_page_or_subpage_of(page))
            .collect()
    }

    /// Every `(type, id, record)` entry, for reconciliation replay.
    pub fn entries(&self) -> impl Iterator<Item = (LearningType, &ContentId, &LearningRecord)> {
        self.records
            .iter()
            .flat_map(|(ty, map)| map.iter().map(|(id, record)| (*ty, id, record)))
    }

    /// Merge a patch into the record at `(ty, id)`, creating it if absent.
    /// Returns the merged record.
    pub fn merge(&mut self, ty: LearningType, id: ContentId, patch: &RecordPatch) -> &LearningRecord {
        let record = self.records.entry(ty).or_default().entry(id).or_default();
        record.apply(patch);
        record
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
