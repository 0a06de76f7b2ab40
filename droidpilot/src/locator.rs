use tracing::{debug, trace};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::registry::VersionedLocator;
use serde::{Deserialize, Serialize};

/// Ancestor hops tried by an upward search when none is given
pub const DEFAULT_UPWARD_DEPTH: usize = 3;

/// Lookups per downward search when none is given. Retrying over time is the
/// poller's job, so one lookup per attempt is the norm.
pub const DEFAULT_LOOKUPS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Search the subtrees of the start node and then of its ancestors
    Upward,
    /// Search the subtree of the start node
    Downward,
}

/// A structural search for nodes carrying `identifier`
///
/// `bound` is the number of ancestor hops for [`Direction::Upward`] and the
/// number of immediate lookups for [`Direction::Downward`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeQuery {
    identifier: String,
    direction: Direction,
    bound: usize,
}

impl NodeQuery {
    pub fn downward(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            direction: Direction::Downward,
            bound: DEFAULT_LOOKUPS,
        }
    }

    pub fn upward(identifier: impl Into<String>, max_depth: usize) -> Self {
        Self {
            identifier: identifier.into(),
            direction: Direction::Upward,
            bound: max_depth,
        }
    }

    pub fn with_bound(mut self, bound: usize) -> Self {
        self.bound = bound;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn bound(&self) -> usize {
        self.bound
    }
}

/// Bounded structural search over a live tree
///
/// The locator never waits and never refreshes the tree. Callers that want
/// to retry across re-renders fetch a fresh root on every poll attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeLocator;

impl NodeLocator {
    pub fn new() -> Self {
        Self
    }

    /// One lookup under `root`, surfacing stale references as errors
    pub fn find(&self, root: &UIElement, identifier: &str) -> Result<Vec<UIElement>, AutomationError> {
        root.find_by_view_id(identifier)
    }

    /// Walk from `start` towards the root, returning the matches of the first
    /// node whose subtree contains `identifier`. `max_depth` bounds the number
    /// of hops; 0 only searches `start`. Any failure yields an empty list.
    pub fn find_upward(&self, start: &UIElement, identifier: &str, max_depth: usize) -> Vec<UIElement> {
        self.try_find_upward(start, identifier, max_depth)
            .unwrap_or_else(|e| {
                debug!("Upward search for {} abandoned: {}", identifier, e);
                Vec::new()
            })
    }

    /// Up to `retry_times` immediate lookups under the same `root`. A missing
    /// root or a stale reference yields an empty list straight away.
    pub fn find_with_retry(
        &self,
        root: Option<&UIElement>,
        identifier: &str,
        retry_times: usize,
    ) -> Vec<UIElement> {
        let Some(root) = root else {
            return Vec::new();
        };
        self.try_find_with_retry(root, identifier, retry_times)
            .unwrap_or_else(|e| {
                debug!("Lookup for {} abandoned: {}", identifier, e);
                Vec::new()
            })
    }

    /// Run a [`NodeQuery`]. Unlike the list-returning helpers this keeps
    /// structural errors visible so callers can stop retrying.
    pub fn search(
        &self,
        start: Option<&UIElement>,
        query: &NodeQuery,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let Some(start) = start else {
            trace!("No root attached, nothing to search");
            return Ok(Vec::new());
        };
        match query.direction() {
            Direction::Upward => self.try_find_upward(start, query.identifier(), query.bound()),
            Direction::Downward => self.try_find_with_retry(start, query.identifier(), query.bound()),
        }
    }

    /// [`NodeLocator::search`] narrowed by the locator's text pattern
    pub fn resolve(
        &self,
        start: Option<&UIElement>,
        query: &NodeQuery,
        locator: &VersionedLocator,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let found = self.search(start, query)?;
        if !locator.has_text_filter() {
            return Ok(found);
        }
        let total = found.len();
        let kept: Vec<UIElement> = found
            .into_iter()
            .filter(|node| locator.matches_text(node.text().as_deref()))
            .collect();
        trace!(
            key = %locator.key(),
            total,
            kept = kept.len(),
            "Filtered matches by text"
        );
        Ok(kept)
    }

    fn try_find_upward(
        &self,
        start: &UIElement,
        identifier: &str,
        max_depth: usize,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let mut current = Some(start.clone());
        let mut depth = 0;
        while let Some(node) = current {
            let found = node.find_by_view_id(identifier)?;
            if !found.is_empty() {
                trace!(depth, count = found.len(), "Found {} walking upward", identifier);
                return Ok(found);
            }
            if depth == max_depth {
                break;
            }
            current = node.parent()?;
            depth += 1;
        }
        Ok(Vec::new())
    }

    fn try_find_with_retry(
        &self,
        root: &UIElement,
        identifier: &str,
        retry_times: usize,
    ) -> Result<Vec<UIElement>, AutomationError> {
        for lookup in 1..=retry_times {
            let found = self.find(root, identifier)?;
            if !found.is_empty() {
                return Ok(found);
            }
            trace!(lookup, "No match for {}", identifier);
        }
        Ok(Vec::new())
    }
}
