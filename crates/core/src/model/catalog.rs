use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::model::ids::ContentId;

/// Root sentinel parent for top-level module trees.
pub const MODULES_ROOT: &str = "modules";

/// Root sentinel for the track collection.
pub const TRACKS_ROOT: &str = "tracks";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("minutes range min ({min}) exceeds max ({max})")]
    InvalidRange { min: u32, max: u32 },
}

//
// ─── MINUTES RANGE ─────────────────────────────────────────────────────────────
//

/// Estimated time for a catalog entry, in minutes, as a `[min, max]` pair.
///
/// Serializes as a two-element array to match the catalog wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct MinutesRange {
    min: u32,
    max: u32,
}

impl MinutesRange {
    /// Creates a new range.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidRange` if `min > max`.
    pub fn new(min: u32, max: u32) -> Result<Self, CatalogError> {
        if min > max {
            return Err(CatalogError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Midpoint of the two bounds.
    #[must_use]
    pub fn avg(&self) -> f64 {
        f64::from(self.min + self.max) / 2.0
    }
}

impl TryFrom<(u32, u32)> for MinutesRange {
    type Error = CatalogError;

    fn try_from((min, max): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl From<MinutesRange> for (u32, u32) {
    fn from(range: MinutesRange) -> Self {
        (range.min, range.max)
    }
}

//
// ─── CONTENT NODE ──────────────────────────────────────────────────────────────
//

/// A single entry in the content catalog.
///
/// Nodes form the module trees: a module root has the sentinel parent
/// `modules`; everything below it is a unit page. The engine never
/// mutates nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    id: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<ContentId>,
    #[serde(default)]
    is_fork: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minutes: Option<MinutesRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remaining: Option<MinutesRange>,
}

impl ContentNode {
    /// Creates a new node with no children and no time estimates.
    #[must_use]
    pub fn new(id: impl Into<ContentId>, parent: Option<ContentId>) -> Self {
        Self {
            id: id.into(),
            parent,
            children: Vec::new(),
            is_fork: false,
            minutes: None,
            remaining: None,
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<ContentId>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_fork(mut self, is_fork: bool) -> Self {
        self.is_fork = is_fork;
        self
    }

    #[must_use]
    pub fn with_minutes(mut self, minutes: MinutesRange) -> Self {
        self.minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_remaining(mut self, remaining: MinutesRange) -> Self {
        self.remaining = Some(remaining);
        self
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> &ContentId {
        &self.id
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ContentId> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn children(&self) -> &[ContentId] {
        &self.children
    }

    /// True when the node is a branching point rather than a linear step.
    #[must_use]
    pub fn is_fork(&self) -> bool {
        self.is_fork
    }

    #[must_use]
    pub fn minutes(&self) -> Option<MinutesRange> {
        self.minutes
    }

    #[must_use]
    pub fn remaining(&self) -> Option<MinutesRange> {
        self.remaining
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Read-only content catalog: module trees plus track membership.
///
/// Supplied externally (deserializable from JSON) and injected into every
/// component that needs it. Track identifiers are not nodes; they live
/// only in the membership map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    nodes: BTreeMap<ContentId, ContentNode>,
    #[serde(default)]
    tracks: BTreeMap<ContentId, Vec<ContentId>>,
}

impl Catalog {
    #[must_use]
    pub fn new(
        nodes: impl IntoIterator<Item = ContentNode>,
        tracks: impl IntoIterator<Item = (ContentId, Vec<ContentId>)>,
    ) -> Self {
        Self {
            nodes: nodes
                .into_iter()
                .map(|node| (node.id().clone(), node))
                .collect(),
            tracks: tracks.into_iter().collect(),
        }
    }

    /// Look up a node by identifier.
    #[must_use]
    pub fn node(&self, id: &ContentId) -> Option<&ContentNode> {
        self.nodes.get(id)
    }

    /// Number of nodes in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &ContentId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn is_track(&self, id: &ContentId) -> bool {
        self.tracks.contains_key(id)
    }

    /// Member modules of a track, in catalog order. Empty for unknown tracks.
    #[must_use]
    pub fn track_modules(&self, id: &ContentId) -> &[ContentId] {
        self.tracks.get(id).map_or(&[], Vec::as_slice)
    }

    /// All tracks with their member modules, in catalog order.
    pub fn tracks(&self) -> impl Iterator<Item = (&ContentId, &[ContentId])> {
        self.tracks
            .iter()
            .map(|(id, modules)| (id, modules.as_slice()))
    }

    /// Tracks that list the given module as a member.
    #[must_use]
    pub fn tracks_containing(&self, module_id: &ContentId) -> Vec<ContentId> {
        self.tracks
            .iter()
            .filter(|(_, modules)| modules.contains(module_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ascends parent links from `id` to the module root: the node whose
    /// parent is the `modules` sentinel, or which has no (known) parent.
    ///
    /// Returns `None` only when `id` itself is not a known node.
    #[must_use]
    pub fn module_root(&self, id: &ContentId) -> Option<ContentId> {
        let mut node = self.nodes.get(id)?;
        let mut hops = 0usize;
        loop {
            match node.parent() {
                Some(parent) if parent.as_str() == MODULES_ROOT => {
                    return Some(node.id().clone());
                }
                Some(parent) => match self.nodes.get(parent) {
                    Some(next) => {
                        hops += 1;
                        if hops > self.nodes.len() {
                            // parent cycle; treat the current node as root
                            return Some(node.id().clone());
                        }
                        node = next;
                    }
                    None => return Some(node.id().clone()),
                },
                None => return Some(node.id().clone()),
            }
        }
    }

    /// All descendants of `id` in pre-order (each child before its own
    /// descendants, in catalog child order), excluding `id` itself.
    ///
    /// Iterative walk with a visited guard, so malformed catalogs with
    /// cycles or shared children terminate.
    #[must_use]
    pub fn descendants(&self, id: &ContentId) -> Vec<ContentId> {
        let Some(root) = self.nodes.get(id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut seen: HashSet<&ContentId> = HashSet::new();
        seen.insert(root.id());

        let mut stack: Vec<&ContentId> = root.children().iter().rev().collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next.clone());
            if let Some(node) = self.nodes.get(next) {
                for child in node.children().iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Pre-order successor of `id` for linear navigation: first child,
    /// else next sibling, else the nearest ancestor's next sibling.
    #[must_use]
    pub fn next_page(&self, id: &ContentId) -> Option<ContentId> {
        let node = self.nodes.get(id)?;
        if let Some(first) = node.children().first() {
            return Some(first.clone());
        }

        let mut current = node;
        let mut hops = 0usize;
        loop {
            let parent_id = current.parent()?;
            if parent_id.as_str() == MODULES_ROOT {
                return None;
            }
            let parent = self.nodes.get(parent_id)?;
            let index = parent
                .children()
                .iter()
                .position(|child| child == current.id())?;
            if let Some(sibling) = parent.children().get(index + 1) {
                return Some(sibling.clone());
            }
            hops += 1;
            if hops > self.nodes.len() {
                return None;
            }
            current = parent;
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
