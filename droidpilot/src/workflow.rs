//! Page-navigation state machine.
//!
//! A workflow is a graph of pages. Each page has at most one outgoing
//! [`PageTransition`]: find a widget by logical key and act on it to reach
//! the next page. Finding is polled; acting happens once. A step's [`StepPolicy`] may also
//! decide that the widget is already in the desired state or that the run
//! should continue on another page.

use crate::element::{utils, UIElement};
use crate::errors::{AutomationError, ConfigError};
use crate::locator::{Direction, NodeLocator, NodeQuery, DEFAULT_LOOKUPS};
use crate::platforms::{AccessibilityEngine, GlobalAction};
use crate::poller::{AttemptResult, Outcome, PollSpec, Poller};
use crate::registry::{LocatorSet, LogicalNodeKey, VersionedLocator, VersionedNodeRegistry};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn, Level};
use uuid::Uuid;

/// Upper bound on transitions in one run unless configured otherwise
pub const DEFAULT_MAX_TRANSITIONS: usize = 64;

/// Name of a page (screen) of the automated app
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Descriptive data about a page, only used in logs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub title: String,
    /// Platform class of the screen, e.g. an activity name
    pub class_name: Option<String>,
}

impl PageInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            class_name: None,
        }
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }
}

/// What to do with the node a step found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Click the node or its closest clickable ancestor
    Click,
    LongClick,
    SetText(String),
    /// Only wait for the node
    Verify,
    /// Press the system back button once the node is visible
    Back,
}

/// Which match receives the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodePick {
    #[default]
    First,
    Last,
}

/// A step policy's verdict on the nodes found by one attempt
#[derive(Debug, Clone)]
pub enum Judgement {
    /// Perform the step action on these nodes
    Act(Vec<UIElement>),
    /// Target already in the desired state: advance without acting
    AlreadyDone,
    /// Keep polling
    NotYet,
    /// Continue on another page without acting
    Branch(PageId),
}

/// A judgement that ends the poll, with the acted-on node already picked
#[derive(Debug)]
enum Verdict {
    Act(UIElement),
    AlreadyDone,
    Branch(PageId),
}

/// Step-specific decision logic, applied to every non-empty match set
pub trait StepPolicy: Send + Sync + fmt::Debug {
    fn judge(&self, matches: Vec<UIElement>) -> Result<Judgement, AutomationError>;
}

/// Act on whatever was found
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl StepPolicy for Always {
    fn judge(&self, matches: Vec<UIElement>) -> Result<Judgement, AutomationError> {
        Ok(Judgement::Act(matches))
    }
}

/// Skip the action when a match is already selected or checked (tabs,
/// checkboxes)
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipIfSelected;

impl StepPolicy for SkipIfSelected {
    fn judge(&self, matches: Vec<UIElement>) -> Result<Judgement, AutomationError> {
        if matches.iter().any(|n| n.is_selected() || n.is_checked()) {
            Ok(Judgement::AlreadyDone)
        } else {
            Ok(Judgement::Act(matches))
        }
    }
}

/// Only act on editable matches; wait while none is editable
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireEditable;

impl StepPolicy for RequireEditable {
    fn judge(&self, matches: Vec<UIElement>) -> Result<Judgement, AutomationError> {
        let editable: Vec<UIElement> = matches.into_iter().filter(|n| n.is_editable()).collect();
        if editable.is_empty() {
            Ok(Judgement::NotYet)
        } else {
            Ok(Judgement::Act(editable))
        }
    }
}

/// Adapter turning a closure into a [`StepPolicy`]
pub struct FnPolicy<F> {
    name: &'static str,
    f: F,
}

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").field("name", &self.name).finish()
    }
}

impl<F> StepPolicy for FnPolicy<F>
where
    F: Fn(Vec<UIElement>) -> Result<Judgement, AutomationError> + Send + Sync,
{
    fn judge(&self, matches: Vec<UIElement>) -> Result<Judgement, AutomationError> {
        (self.f)(matches)
    }
}

pub fn policy_fn<F>(name: &'static str, f: F) -> FnPolicy<F>
where
    F: Fn(Vec<UIElement>) -> Result<Judgement, AutomationError> + Send + Sync,
{
    FnPolicy { name, f }
}

/// One edge of the page graph
#[derive(Debug, Clone)]
pub struct PageTransition {
    from: PageId,
    key: LogicalNodeKey,
    to: PageId,
    action: NodeAction,
    spec: Option<PollSpec>,
    direction: Direction,
    bound: usize,
    anchor: Option<LogicalNodeKey>,
    settle: Duration,
    pick: NodePick,
    policy: Arc<dyn StepPolicy>,
}

impl PageTransition {
    /// Click `key` on page `from` to reach page `to`
    pub fn new(
        from: impl Into<PageId>,
        key: impl Into<LogicalNodeKey>,
        to: impl Into<PageId>,
    ) -> Self {
        Self {
            from: from.into(),
            key: key.into(),
            to: to.into(),
            action: NodeAction::Click,
            spec: None,
            direction: Direction::Downward,
            bound: DEFAULT_LOOKUPS,
            anchor: None,
            settle: Duration::ZERO,
            pick: NodePick::First,
            policy: Arc::new(Always),
        }
    }

    pub fn action(mut self, action: NodeAction) -> Self {
        self.action = action;
        self
    }

    /// Poll timing for this step; defaults to [`PollSpec::with_label`]
    pub fn timing(mut self, spec: PollSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Structural lookups per attempt for the downward search
    pub fn lookups(mut self, lookups: usize) -> Self {
        self.direction = Direction::Downward;
        self.bound = lookups;
        self.anchor = None;
        self
    }

    /// Find `anchor` first, then search upward from it for the step key,
    /// at most `max_depth` ancestors away
    pub fn near(mut self, anchor: impl Into<LogicalNodeKey>, max_depth: usize) -> Self {
        self.direction = Direction::Upward;
        self.bound = max_depth;
        self.anchor = Some(anchor.into());
        self
    }

    /// Pause before polling, letting the page settle after the previous step
    pub fn settle(mut self, delay: Duration) -> Self {
        self.settle = delay;
        self
    }

    pub fn pick(mut self, pick: NodePick) -> Self {
        self.pick = pick;
        self
    }

    pub fn policy(mut self, policy: impl StepPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn from_page(&self) -> &PageId {
        &self.from
    }

    pub fn to_page(&self) -> &PageId {
        &self.to
    }

    pub fn key(&self) -> &LogicalNodeKey {
        &self.key
    }

    fn keys(&self) -> impl Iterator<Item = &LogicalNodeKey> {
        std::iter::once(&self.key).chain(self.anchor.iter())
    }

    fn poll_spec(&self) -> PollSpec {
        self.spec.clone().unwrap_or_else(|| {
            PollSpec::with_label(format!("{} -> {} via {}", self.from, self.to, self.key))
        })
    }
}

/// How a completed step advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResolution {
    Acted,
    Skipped,
    Branched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub from: PageId,
    pub to: PageId,
    pub key: LogicalNodeKey,
    pub resolution: StepResolution,
    pub attempts: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Structural,
    Configuration,
    Action,
    Internal,
}

impl FailureKind {
    fn of(error: &AutomationError) -> Self {
        match error {
            AutomationError::Timeout(_) => FailureKind::Timeout,
            AutomationError::ElementDetached(_) => FailureKind::Structural,
            AutomationError::Configuration(_) => FailureKind::Configuration,
            AutomationError::ActionFailed(_) => FailureKind::Action,
            _ => FailureKind::Internal,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Structural => "structural",
            FailureKind::Configuration => "configuration",
            FailureKind::Action => "action",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// The first step that could not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step on page '{page}' ({}) failed with {kind} after {attempts} attempts in {elapsed:?}: {message}", key_or_dash(.key))]
pub struct StepFailure {
    pub page: PageId,
    /// Missing when the run failed before any key was involved
    pub key: Option<LogicalNodeKey>,
    pub kind: FailureKind,
    pub attempts: usize,
    pub elapsed: Duration,
    pub message: String,
}

fn key_or_dash(key: &Option<LogicalNodeKey>) -> &str {
    key.as_ref().map(LogicalNodeKey::as_str).unwrap_or("-")
}

impl StepFailure {
    fn before_poll(page: &PageId, key: Option<&LogicalNodeKey>, error: &AutomationError) -> Self {
        Self {
            page: page.clone(),
            key: key.cloned(),
            kind: FailureKind::of(error),
            attempts: 0,
            elapsed: Duration::ZERO,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed {
        final_page: PageId,
        steps: Vec<StepReport>,
    },
    Failed {
        failure: StepFailure,
        steps: Vec<StepReport>,
    },
}

impl WorkflowOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkflowOutcome::Completed { .. })
    }

    pub fn steps(&self) -> &[StepReport] {
        match self {
            WorkflowOutcome::Completed { steps, .. } | WorkflowOutcome::Failed { steps, .. } => steps,
        }
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            WorkflowOutcome::Failed { failure, .. } => Some(failure),
            WorkflowOutcome::Completed { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<PageId, StepFailure> {
        match self {
            WorkflowOutcome::Completed { final_page, .. } => Ok(final_page),
            WorkflowOutcome::Failed { failure, .. } => Err(failure),
        }
    }
}

/// Declarative description of a workflow, turned into a [`PageWorkflow`]
/// once its collaborators are known
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    name: String,
    transitions: Vec<PageTransition>,
    pages: HashMap<PageId, PageInfo>,
    max_transitions: usize,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: Vec::new(),
            pages: HashMap::new(),
            max_transitions: DEFAULT_MAX_TRANSITIONS,
        }
    }

    pub fn page(mut self, id: impl Into<PageId>, info: PageInfo) -> Self {
        self.pages.insert(id.into(), info);
        self
    }

    pub fn step(mut self, transition: PageTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn max_transitions(mut self, max: usize) -> Self {
        self.max_transitions = max;
        self
    }

    /// Every logical key the steps refer to
    pub fn keys(&self) -> Vec<&LogicalNodeKey> {
        let mut keys: Vec<&LogicalNodeKey> = self.transitions.iter().flat_map(|t| t.keys()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Wire the steps to their collaborators. Fails when two steps leave the
    /// same page or when any version of `registry` lacks a key a step uses.
    pub fn build(
        self,
        engine: Arc<dyn AccessibilityEngine>,
        registry: Arc<VersionedNodeRegistry>,
        poller: Poller,
        locator: NodeLocator,
    ) -> Result<PageWorkflow, AutomationError> {
        registry.validate_keys(self.keys())?;

        let mut transitions = HashMap::with_capacity(self.transitions.len());
        for transition in self.transitions {
            if transitions.contains_key(&transition.from) {
                return Err(ConfigError::DuplicatePage(transition.from.to_string()).into());
            }
            transitions.insert(transition.from.clone(), transition);
        }

        Ok(PageWorkflow {
            name: self.name,
            engine,
            registry,
            poller,
            locator,
            transitions,
            pages: self.pages,
            max_transitions: self.max_transitions,
        })
    }
}

/// A runnable page graph bound to an engine and a locator table
pub struct PageWorkflow {
    name: String,
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<VersionedNodeRegistry>,
    poller: Poller,
    locator: NodeLocator,
    transitions: HashMap<PageId, PageTransition>,
    pages: HashMap<PageId, PageInfo>,
    max_transitions: usize,
}

impl fmt::Debug for PageWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageWorkflow")
            .field("name", &self.name)
            .field("transitions", &self.transitions.len())
            .field("max_transitions", &self.max_transitions)
            .finish()
    }
}

impl PageWorkflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run from `start_page` until a page without outgoing step is reached,
    /// or until the first step fails
    #[instrument(skip_all, fields(workflow = %self.name, run_id = %Uuid::new_v4()))]
    pub async fn run(&self, start_page: impl Into<PageId>) -> WorkflowOutcome {
        let mut current = start_page.into();
        let mut steps = Vec::new();

        let version = match self.engine.app_version().await {
            Ok(version) => version,
            Err(e) => {
                let error = AutomationError::from(ConfigError::VersionProbe(e.to_string()));
                return self.fail(StepFailure::before_poll(&current, None, &error), steps);
            }
        };
        let set = match self.registry.resolve(&version) {
            Ok(set) => set,
            Err(e) => return self.fail(StepFailure::before_poll(&current, None, &e), steps),
        };
        info!(version = %version, start = %current, "Workflow started");

        loop {
            let Some(transition) = self.transitions.get(&current) else {
                info!(final_page = %current, steps = steps.len(), "Workflow completed");
                return WorkflowOutcome::Completed {
                    final_page: current,
                    steps,
                };
            };
            if steps.len() >= self.max_transitions {
                let error = AutomationError::from(ConfigError::TooManyTransitions(self.max_transitions));
                return self.fail(StepFailure::before_poll(&current, None, &error), steps);
            }

            match self.run_step(transition, set).await {
                Ok(report) => {
                    current = report.to.clone();
                    steps.push(report);
                }
                Err(failure) => return self.fail(failure, steps),
            }
        }
    }

    fn fail(&self, failure: StepFailure, steps: Vec<StepReport>) -> WorkflowOutcome {
        warn!(
            page = %failure.page,
            kind = %failure.kind,
            attempts = failure.attempts,
            "Workflow aborted: {}",
            failure.message
        );
        WorkflowOutcome::Failed { failure, steps }
    }

    /// Log the tree the last attempt saw. Never fetches a new root.
    fn dump_tree(&self, root: Option<&UIElement>) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        match root {
            Some(root) => match serde_json::to_string(&root.to_serializable_tree(12)) {
                Ok(tree) => debug!(tree = %tree, "Tree at failure"),
                Err(e) => debug!("Could not serialize tree: {}", e),
            },
            None => debug!("No window attached at failure"),
        }
    }

    #[instrument(skip_all, fields(from = %transition.from, key = %transition.key, to = %transition.to))]
    async fn run_step(
        &self,
        transition: &PageTransition,
        set: LocatorSet<'_>,
    ) -> Result<StepReport, StepFailure> {
        let page = self.pages.get(&transition.from);
        let page_title = page.map(|p| p.title.as_str()).unwrap_or_default();
        let screen = page.and_then(|p| p.class_name.as_deref()).unwrap_or("-");
        let locator = set
            .get(&transition.key)
            .map_err(|e| StepFailure::before_poll(&transition.from, Some(&transition.key), &e))?;
        let anchor = match &transition.anchor {
            Some(anchor) => Some(
                set.get(anchor)
                    .map_err(|e| StepFailure::before_poll(&transition.from, Some(anchor), &e))?,
            ),
            None => None,
        };
        debug!(
            page_title,
            screen,
            id = locator.concrete_id(),
            "Looking for {}",
            locator.description()
        );

        if !transition.settle.is_zero() {
            tokio::time::sleep(transition.settle).await;
        }

        let spec = transition.poll_spec();
        let mut last_root = None;
        let outcome = self
            .poller
            .logged(&spec, || {
                last_root = self.engine.root_element();
                futures::future::ready(self.evaluate(transition, locator, anchor, last_root.as_ref()))
            })
            .await;

        let (verdict, attempts, elapsed) = match outcome {
            Outcome::Success {
                value,
                elapsed,
                attempts,
            } => (value, attempts, elapsed),
            Outcome::TimedOut { elapsed, attempts } => {
                self.dump_tree(last_root.as_ref());
                return Err(StepFailure {
                    page: transition.from.clone(),
                    key: Some(transition.key.clone()),
                    kind: FailureKind::Timeout,
                    attempts,
                    elapsed,
                    message: format!("{} ({}) never appeared", locator.concrete_id(), locator.description()),
                });
            }
            Outcome::Error {
                cause,
                elapsed,
                attempts,
            } => {
                self.dump_tree(last_root.as_ref());
                return Err(StepFailure {
                    page: transition.from.clone(),
                    key: Some(transition.key.clone()),
                    kind: FailureKind::of(&cause),
                    attempts,
                    elapsed,
                    message: cause.to_string(),
                });
            }
        };

        let (resolution, to) = match verdict {
            Verdict::Act(node) => {
                if let Err(e) = self.perform(&transition.action, &node) {
                    self.dump_tree(last_root.as_ref());
                    return Err(StepFailure {
                        page: transition.from.clone(),
                        key: Some(transition.key.clone()),
                        kind: match FailureKind::of(&e) {
                            FailureKind::Structural => FailureKind::Structural,
                            _ => FailureKind::Action,
                        },
                        attempts,
                        elapsed,
                        message: e.to_string(),
                    });
                }
                (StepResolution::Acted, transition.to.clone())
            }
            Verdict::AlreadyDone => {
                debug!("Target already in place, skipping {:?}", transition.action);
                (StepResolution::Skipped, transition.to.clone())
            }
            Verdict::Branch(page) => (StepResolution::Branched, page),
        };

        info!(?resolution, next = %to, attempts, "Step done");
        Ok(StepReport {
            from: transition.from.clone(),
            to,
            key: transition.key.clone(),
            resolution,
            attempts,
            elapsed,
        })
    }

    /// One poll attempt against a freshly fetched root
    fn evaluate(
        &self,
        transition: &PageTransition,
        locator: &VersionedLocator,
        anchor: Option<&VersionedLocator>,
        root: Option<&UIElement>,
    ) -> AttemptResult<Verdict> {
        let start = match anchor {
            Some(anchor) => {
                let query = NodeQuery::downward(anchor.concrete_id());
                match self.locator.resolve(root, &query, anchor) {
                    Ok(found) => match found.into_iter().next() {
                        Some(node) => Some(node),
                        None => return AttemptResult::NotYet,
                    },
                    Err(e) => return AttemptResult::Failed(e),
                }
            }
            None => root.cloned(),
        };

        let query = match transition.direction {
            Direction::Upward => NodeQuery::upward(locator.concrete_id(), transition.bound),
            Direction::Downward => NodeQuery::downward(locator.concrete_id()).with_bound(transition.bound),
        };
        let matches = match self.locator.resolve(start.as_ref(), &query, locator) {
            Ok(matches) if matches.is_empty() => return AttemptResult::NotYet,
            Ok(matches) => matches,
            Err(e) => return AttemptResult::Failed(e),
        };

        match transition.policy.judge(matches) {
            Ok(Judgement::Act(nodes)) => {
                let node = match transition.pick {
                    NodePick::First => nodes.into_iter().next(),
                    NodePick::Last => nodes.into_iter().last(),
                };
                node.map(Verdict::Act).into()
            }
            Ok(Judgement::AlreadyDone) => AttemptResult::Found(Verdict::AlreadyDone),
            Ok(Judgement::Branch(page)) => AttemptResult::Found(Verdict::Branch(page)),
            Ok(Judgement::NotYet) => AttemptResult::NotYet,
            Err(e) => AttemptResult::Failed(e),
        }
    }

    fn perform(&self, action: &NodeAction, node: &UIElement) -> Result<(), AutomationError> {
        debug!(node = %utils::element_identifier(node), ?action, "Performing action");
        match action {
            NodeAction::Click => node.click_nearest_clickable(),
            NodeAction::LongClick => node.long_click(),
            NodeAction::SetText(text) => node.set_text(text),
            NodeAction::Verify => Ok(()),
            NodeAction::Back => self.engine.global_action(GlobalAction::Back),
        }
    }
}
