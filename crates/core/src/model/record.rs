use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed achievement identifier granted when the first module completes.
pub const GRAND_OPENING: &str = "grand-opening";

//
// ─── LEARNING TYPE ─────────────────────────────────────────────────────────────
//

/// Classification of a progress record.
///
/// Every record lives under exactly one of these buckets. `Achievements`
/// entries are keyed by achievement identifiers rather than page ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LearningType {
    Achievements,
    Tracks,
    Modules,
    Units,
}

impl LearningType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningType::Achievements => "achievements",
            LearningType::Tracks => "tracks",
            LearningType::Modules => "modules",
            LearningType::Units => "units",
        }
    }
}

impl fmt::Display for LearningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── LEARNING RECORD ───────────────────────────────────────────────────────────
//

/// Progress record for a single `(type, id)` pair.
///
/// Callers are expected to pass monotonically increasing timestamps:
/// `completed_at`, once set, never moves earlier, and `started_at` is not
/// overwritten by a later start. The record itself is a plain field bag;
/// the write path upholds the invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_type: Option<String>,
}

impl LearningRecord {
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// The later of the start and completion timestamps, if any.
    #[must_use]
    pub fn touched_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.max(self.completed_at)
    }

    /// Unconditional per-field merge: every field present in the patch
    /// replaces the stored value (last write wins per field).
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(at) = patch.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(at) = patch.earned_at {
            self.earned_at = Some(at);
        }
        if let Some(kind) = &patch.achievement_type {
            self.achievement_type = Some(kind.clone());
        }
    }

    /// The record as a patch carrying every set field, for replaying
    /// locally buffered progress through the write path.
    #[must_use]
    pub fn to_patch(&self) -> RecordPatch {
        RecordPatch {
            started_at: self.started_at,
            completed_at: self.completed_at,
            earned_at: self.earned_at,
            achievement_type: self.achievement_type.clone(),
        }
    }
}

//
// ─── RECORD PATCH ──────────────────────────────────────────────────────────────
//

/// Partial update for a learning record; only present fields are applied.
///
/// This is also the remote partial-update wire fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_type: Option<String>,
}

impl RecordPatch {
    /// Patch marking a start.
    #[must_use]
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            ..Self::default()
        }
    }

    /// Patch marking a completion.
    #[must_use]
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            completed_at: Some(at),
            ..Self::default()
        }
    }

    /// Patch granting an achievement.
    #[must_use]
    pub fn achievement(kind: impl Into<String>, earned_at: DateTime<Utc>) -> Self {
        Self {
            earned_at: Some(earned_at),
            achievement_type: Some(kind.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started_at.is_none()
            && self.completed_at.is_none()
            && self.earned_at.is_none()
            && self.achievement_type.is_none()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn learning_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LearningType::Units).unwrap(),
            "\"units\""
        );
        let ty: LearningType = serde_json::from_str("\"achievements\"").unwrap();
        assert_eq!(ty, LearningType::Achievements);
    }

    #[test]
    fn apply_merges_present_fields_only() {
        let now = fixed_now();
        let mut record = LearningRecord::default();
        record.apply(&RecordPatch::started(now));
        assert_eq!(record.started_at, Some(now));
        assert_eq!(record.completed_at, None);

        let later = now + chrono::Duration::minutes(5);
        record.apply(&RecordPatch::completed(later));
        assert_eq!(record.started_at, Some(now));
        assert_eq!(record.completed_at, Some(later));
    }

    #[test]
    fn touched_at_is_latest_of_start_and_completion() {
        let now = fixed_now();
        let later = now + chrono::Duration::minutes(3);

        let record = LearningRecord {
            started_at: Some(now),
            ..LearningRecord::default()
        };
        assert_eq!(record.touched_at(), Some(now));

        let record = LearningRecord {
            started_at: Some(now),
            completed_at: Some(later),
            ..LearningRecord::default()
        };
        assert_eq!(record.touched_at(), Some(later));

        assert_eq!(LearningRecord::default().touched_at(), None);
    }

    #[test]
    fn patch_round_trips_through_record() {
        let now = fixed_now();
        let patch = RecordPatch::achievement("standard", now);
        let mut record = LearningRecord::default();
        record.apply(&patch);
        assert_eq!(record.to_patch(), patch);
    }

    #[test]
    fn empty_fields_are_omitted_from_json() {
        let now = fixed_now();
        let record = LearningRecord {
            started_at: Some(now),
            ..LearningRecord::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("started_at"));
        assert!(!json.contains("completed_at"));
        assert!(!json.contains("achievement_type"));
    }
}
