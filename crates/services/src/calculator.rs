use std::sync::Arc;

use progress_core::model::{
    Catalog, ContentId, LearningRecord, LearningType, ProgressState, MODULES_ROOT, TRACKS_ROOT,
};

//
// ─── LAST ACCESSED ─────────────────────────────────────────────────────────────
//

/// A record tagged with its id, as returned by last-accessed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAccessed {
    pub id: ContentId,
    pub record: LearningRecord,
}

//
// ─── CALCULATOR ────────────────────────────────────────────────────────────────
//

/// Read-side progress queries: classification, active-path derivation, and
/// the time-weighted module completion percentage.
///
/// The calculator only ever reads; it takes the catalog at construction
/// and the progress snapshot per call.
#[derive(Clone)]
pub struct ProgressCalculator {
    catalog: Arc<Catalog>,
}

impl ProgressCalculator {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Classify a content identifier into its learning type.
    ///
    /// The literal container roots `modules` and `tracks` are not pages
    /// and classify as `None`, as does anything unknown to the catalog.
    #[must_use]
    pub fn classify(&self, id: &ContentId) -> Option<LearningType> {
        if id.as_str() == MODULES_ROOT || id.as_str() == TRACKS_ROOT {
            return None;
        }
        match self.catalog.module_root(id) {
            Some(root) if root == *id => Some(LearningType::Modules),
            Some(_) => Some(LearningType::Units),
            None if self.catalog.is_track(id) => Some(LearningType::Tracks),
            None => None,
        }
    }

    /// The module root of `id`, if `id` is a known node.
    #[must_use]
    pub fn module_root(&self, id: &ContentId) -> Option<ContentId> {
        self.catalog.module_root(id)
    }

    /// The child root anchoring the active path: the parent of `active`
    /// when that parent is a known non-fork node, else `active` itself.
    fn child_root(&self, active: &ContentId) -> ContentId {
        self.catalog
            .node(active)
            .and_then(|node| node.parent())
            .and_then(|parent| self.catalog.node(parent))
            .filter(|parent| !parent.is_fork())
            .map_or_else(|| active.clone(), |parent| parent.id().clone())
    }

    /// The content ids relevant to the learner's current position:
    /// ancestors of the child root (topmost first), the child root, then
    /// its descendants in pre-order. Unknown `active` yields an empty path.
    #[must_use]
    pub fn active_path_ids(&self, active: &ContentId) -> Vec<ContentId> {
        if !self.catalog.contains(active) {
            return Vec::new();
        }
        let child_root = self.child_root(active);

        let mut path = vec![child_root.clone()];
        for ancestor in self.ancestors_of(&child_root) {
            path.insert(0, ancestor);
        }
        path.extend(self.catalog.descendants(&child_root));
        path
    }

    /// Ancestors of `id` up to (excluding) the `modules` sentinel, nearest
    /// first. Bounded so a pathological parent cycle terminates.
    fn ancestors_of(&self, id: &ContentId) -> Vec<ContentId> {
        let mut ancestors = Vec::new();
        let mut current = self.catalog.node(id);
        while let Some(node) = current {
            let Some(parent_id) = node.parent() else { break };
            if parent_id.as_str() == MODULES_ROOT {
                break;
            }
            let Some(parent) = self.catalog.node(parent_id) else {
                break;
            };
            ancestors.push(parent.id().clone());
            if ancestors.len() > self.catalog.len() {
                break;
            }
            current = Some(parent);
        }
        ancestors
    }

    /// Time-weighted completion percentage for the module containing
    /// `page_id`, in `0..=100`.
    ///
    /// For a top-level module root the learner's most recently touched
    /// page under the module anchors the path; otherwise `page_id` itself
    /// does. The baseline is the child root's `remaining` estimate plus
    /// ancestor `minutes` up the chain; completed units on the active path
    /// count their `minutes` midpoint against it. With no baseline at all
    /// the completed/total page count decides.
    #[must_use]
    pub fn module_progress(&self, state: &ProgressState, page_id: &ContentId) -> u8 {
        let Some(page) = self.catalog.node(page_id) else {
            return 0;
        };

        let active_item = if page
            .parent()
            .is_some_and(|parent| parent.as_str() == MODULES_ROOT)
        {
            self.last_accessed(state, LearningType::Units, page_id)
                .map_or_else(|| page_id.clone(), |last| last.id)
        } else {
            page_id.clone()
        };

        let path = self.active_path_ids(&active_item);
        let child_root = self.child_root(&active_item);

        let mut lo: u64 = 0;
        let mut hi: u64 = 0;
        if let Some(remaining) = self.catalog.node(&child_root).and_then(|n| n.remaining()) {
            lo += u64::from(remaining.min());
            hi += u64::from(remaining.max());
        }
        for ancestor in self.ancestors_of(&child_root) {
            if let Some(minutes) = self.catalog.node(&ancestor).and_then(|n| n.minutes()) {
                lo += u64::from(minutes.min());
                hi += u64::from(minutes.max());
            }
        }
        let base_time_avg = (lo + hi) as f64 / 2.0;

        let module_root = self.catalog.module_root(page_id);
        let mut completed_avg = 0.0;
        let mut completed_count = 0usize;
        for (unit_id, record) in state.records_of(LearningType::Units) {
            if !record.is_completed() {
                continue;
            }
            if self.catalog.module_root(unit_id) != module_root {
                continue;
            }
            if !path.contains(unit_id) {
                continue;
            }
            completed_count += 1;
            if let Some(minutes) = self.catalog.node(unit_id).and_then(|n| n.minutes()) {
                completed_avg += minutes.avg();
            }
        }

        let percent = if base_time_avg > 0.0 {
            (100.0 * completed_avg / base_time_avg).round()
        } else if path.is_empty() {
            return 0;
        } else {
            (100.0 * completed_count as f64 / path.len() as f64).round()
        };
        percent.clamp(0.0, 100.0) as u8
    }

    /// The most recently touched record of `ty` addressing `page` or one
    /// of its sub-pages, or `None` when nothing matches.
    #[must_use]
    pub fn last_accessed(
        &self,
        state: &ProgressState,
        ty: LearningType,
        page: &ContentId,
    ) -> Option<LastAccessed> {
        state
            .matching_prefix(ty, page)
            .into_iter()
            .filter_map(|(id, record)| record.touched_at().map(|at| (id, record, at)))
            .max_by_key(|(_, _, at)| *at)
            .map(|(id, record, _)| LastAccessed {
                id: id.clone(),
                record: record.clone(),
            })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
