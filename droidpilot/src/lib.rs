//! Mobile UI automation through accessibility trees
//!
//! Widgets are addressed by version-independent logical keys. A
//! [`VersionedNodeRegistry`] maps each key to the concrete widget id of the
//! running app release. [`PageWorkflow`] strings the steps of a multi-page
//! task together, retrying each lookup with a [`Poller`].

use std::sync::Arc;
use tracing::{debug, instrument};

pub mod catalog;
pub mod element;
pub mod errors;
pub mod locator;
pub mod mailbox;
pub mod platforms;
pub mod poller;
pub mod recipes;
pub mod registry;
#[cfg(test)]
mod tests;
pub mod tracker;
pub mod workflow;

pub use element::{SerializableUIElement, UIElement, UIElementAttributes};
pub use errors::{AutomationError, ConfigError};
pub use locator::{Direction, NodeLocator, NodeQuery};
pub use mailbox::Mailbox;
pub use platforms::{AccessibilityEngine, GlobalAction};
pub use poller::{AttemptResult, Outcome, PollSpec, Poller};
pub use registry::{LocatorSet, LogicalNodeKey, VersionedLocator, VersionedNodeRegistry};
pub use tracker::{LogTracker, NoopTracker, Tracker};
pub use workflow::{
    FailureKind, NodeAction, NodePick, PageId, PageTransition, PageWorkflow, StepFailure,
    StepPolicy, WorkflowBuilder, WorkflowOutcome,
};

/// The main entry point: one engine, one locator table, shared by every
/// workflow built from it
#[derive(Clone)]
pub struct Automation {
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<VersionedNodeRegistry>,
    poller: Poller,
    locator: NodeLocator,
}

impl Automation {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, registry: Arc<VersionedNodeRegistry>) -> Self {
        Self {
            engine,
            registry,
            poller: Poller::new(),
            locator: NodeLocator::new(),
        }
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<VersionedNodeRegistry> {
        &self.registry
    }

    pub fn poller(&self) -> Poller {
        self.poller
    }

    pub fn locator(&self) -> NodeLocator {
        self.locator
    }

    /// Current root of the active window
    pub fn root(&self) -> Option<UIElement> {
        self.engine.root_element()
    }

    /// Locators of the app version currently running
    #[instrument(skip(self))]
    pub async fn active_locators(&self) -> Result<LocatorSet<'_>, AutomationError> {
        let version = self
            .engine
            .app_version()
            .await
            .map_err(|e| ConfigError::VersionProbe(e.to_string()))?;
        self.registry.resolve(&version)
    }

    /// Poll until `key` resolves to at least one node of a fresh tree
    #[instrument(skip(self, spec), fields(label = %spec.label()))]
    pub async fn wait_for(&self, key: &str, spec: &PollSpec) -> Outcome<Vec<UIElement>> {
        let locator = match self.active_locators().await.and_then(|set| set.get(key)) {
            Ok(locator) => locator,
            Err(cause) => {
                return Outcome::Error {
                    cause,
                    elapsed: std::time::Duration::ZERO,
                    attempts: 0,
                }
            }
        };
        debug!(id = locator.concrete_id(), "Waiting for {}", key);
        let query = NodeQuery::downward(locator.concrete_id());
        self.poller
            .logged(spec, || {
                let root = self.engine.root_element();
                let result = match self.locator.resolve(root.as_ref(), &query, locator) {
                    Ok(found) if found.is_empty() => AttemptResult::NotYet,
                    Ok(found) => AttemptResult::Found(found),
                    Err(e) => AttemptResult::Failed(e),
                };
                futures::future::ready(result)
            })
            .await
    }

    /// Bind a workflow description to this automation's collaborators
    pub fn workflow(&self, builder: WorkflowBuilder) -> Result<PageWorkflow, AutomationError> {
        builder.build(
            self.engine.clone(),
            self.registry.clone(),
            self.poller,
            self.locator,
        )
    }
}
