//! In-memory platform adapter
//!
//! Serves recorded or hand-built trees through the same seam a device adapter
//! would. Trees are organised in frames: every call to `root_element` may
//! advance to the next queued frame, which simulates the target app
//! re-rendering between polls. References taken from an older frame report
//! [`AutomationError::ElementDetached`], like a recycled accessibility node.

use super::{AccessibilityEngine, GlobalAction};
use crate::element::{SerializableUIElement, UIElementAttributes, UIElementImpl};
use crate::{AutomationError, UIElement};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// What the engine recorded for each performed action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Click,
    LongClick,
    SetText(String),
    Global(GlobalAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub kind: ActionKind,
    /// View id of the node acted on; `None` for global actions and id-less nodes
    pub view_id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug)]
struct NodeData {
    attributes: UIElementAttributes,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug)]
struct Frame {
    generation: u64,
    nodes: Vec<NodeData>,
}

impl Frame {
    fn build(tree: &SerializableUIElement, generation: u64) -> Self {
        fn push(tree: &SerializableUIElement, parent: Option<usize>, nodes: &mut Vec<NodeData>) -> usize {
            let index = nodes.len();
            nodes.push(NodeData {
                attributes: UIElementAttributes {
                    class_name: tree.class_name.clone(),
                    view_id: tree.view_id.clone().filter(|id| !id.is_empty()),
                    text: tree.text.clone(),
                    description: tree.description.clone(),
                    is_clickable: tree.clickable,
                    is_selected: tree.selected,
                    is_checked: tree.checked,
                    is_editable: tree.editable,
                    child_count: Some(tree.children.len()),
                },
                parent,
                children: Vec::with_capacity(tree.children.len()),
            });
            for child in &tree.children {
                let child_index = push(child, Some(index), nodes);
                nodes[index].children.push(child_index);
            }
            index
        }

        let mut nodes = Vec::new();
        push(tree, None, &mut nodes);
        Self { generation, nodes }
    }
}

#[derive(Debug, Default)]
struct FrameQueue {
    current: Option<Arc<Frame>>,
    pending: VecDeque<Option<SerializableUIElement>>,
}

#[derive(Debug, Default)]
struct EngineState {
    frames: Mutex<FrameQueue>,
    generation: AtomicU64,
    root_fetches: AtomicUsize,
    actions: Mutex<Vec<ActionRecord>>,
    failing_ids: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EngineState {
    fn install(&self, queue: &mut FrameQueue, tree: Option<SerializableUIElement>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        queue.current = tree.map(|t| Arc::new(Frame::build(&t, generation)));
        debug!(generation, attached = queue.current.is_some(), "Installed new tree frame");
    }

    fn record(&self, record: ActionRecord) {
        trace!(?record, "Recording action");
        lock(&self.actions).push(record);
    }
}

/// A scripted, frame-based accessibility engine
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    state: Arc<EngineState>,
    version: Option<String>,
}

impl MemoryEngine {
    /// An engine serving a single, static tree
    pub fn new(version: impl Into<String>, tree: SerializableUIElement) -> Self {
        Self::scripted(version, vec![Some(tree)])
    }

    /// An engine that advances to the next frame on every root fetch.
    /// The last frame stays current once the script runs out; `None` frames
    /// model "no window attached".
    pub fn scripted(version: impl Into<String>, frames: Vec<Option<SerializableUIElement>>) -> Self {
        let state = Arc::new(EngineState::default());
        {
            let mut queue = lock(&state.frames);
            queue.pending = frames.into();
        }
        Self {
            state,
            version: Some(version.into()),
        }
    }

    /// Make the version probe fail
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Swap the current frame immediately, invalidating all handed-out nodes
    pub fn replace_tree(&self, tree: Option<SerializableUIElement>) {
        let mut queue = lock(&self.state.frames);
        self.state.install(&mut queue, tree);
    }

    /// Make every action on nodes with this view id fail
    pub fn fail_actions_on(&self, view_id: impl Into<String>) {
        lock(&self.state.failing_ids).insert(view_id.into());
    }

    /// Actions performed so far, in order
    pub fn actions(&self) -> Vec<ActionRecord> {
        lock(&self.state.actions).clone()
    }

    /// Number of times a root was requested
    pub fn root_fetches(&self) -> usize {
        self.state.root_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AccessibilityEngine for MemoryEngine {
    fn root_element(&self) -> Option<UIElement> {
        self.state.root_fetches.fetch_add(1, Ordering::SeqCst);
        let mut queue = lock(&self.state.frames);
        if let Some(next) = queue.pending.pop_front() {
            self.state.install(&mut queue, next);
        }
        queue.current.clone().map(|frame| {
            UIElement::new(Box::new(MemoryElement {
                state: self.state.clone(),
                frame,
                index: 0,
            }))
        })
    }

    async fn app_version(&self) -> Result<String, AutomationError> {
        self.version.clone().ok_or_else(|| {
            AutomationError::PlatformError("application version is not available".to_string())
        })
    }

    fn global_action(&self, action: GlobalAction) -> Result<(), AutomationError> {
        self.state.record(ActionRecord {
            kind: ActionKind::Global(action),
            view_id: None,
            text: None,
        });
        Ok(())
    }
}

/// A reference into one frame of a [`MemoryEngine`]
#[derive(Debug, Clone)]
pub struct MemoryElement {
    state: Arc<EngineState>,
    frame: Arc<Frame>,
    index: usize,
}

impl MemoryElement {
    fn node(&self) -> &NodeData {
        &self.frame.nodes[self.index]
    }

    fn at(&self, index: usize) -> UIElement {
        UIElement::new(Box::new(MemoryElement {
            state: self.state.clone(),
            frame: self.frame.clone(),
            index,
        }))
    }

    fn ensure_live(&self) -> Result<(), AutomationError> {
        let current = self.state.generation.load(Ordering::SeqCst);
        if current == self.frame.generation {
            Ok(())
        } else {
            Err(AutomationError::ElementDetached(format!(
                "node {} belongs to frame {} but the tree is at frame {}",
                self.index, self.frame.generation, current
            )))
        }
    }

    fn perform(&self, kind: ActionKind) -> Result<(), AutomationError> {
        self.ensure_live()?;
        let attrs = &self.node().attributes;
        if let Some(id) = &attrs.view_id {
            if lock(&self.state.failing_ids).contains(id) {
                return Err(AutomationError::ActionFailed(format!(
                    "{kind:?} rejected by {id}"
                )));
            }
        }
        self.state.record(ActionRecord {
            kind,
            view_id: attrs.view_id.clone(),
            text: attrs.text.clone(),
        });
        Ok(())
    }
}

impl UIElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        ((self.frame.generation << 32) | self.index as u64) as usize
    }

    fn view_id(&self) -> Option<String> {
        self.node().attributes.view_id.clone()
    }

    fn class_name(&self) -> String {
        self.node().attributes.class_name.clone()
    }

    fn attributes(&self) -> UIElementAttributes {
        self.node().attributes.clone()
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.ensure_live()?;
        Ok(self.node().children.iter().map(|&i| self.at(i)).collect())
    }

    fn parent(&self) -> Result<Option<UIElement>, AutomationError> {
        self.ensure_live()?;
        Ok(self.node().parent.map(|i| self.at(i)))
    }

    fn find_by_view_id(&self, view_id: &str) -> Result<Vec<UIElement>, AutomationError> {
        self.ensure_live()?;
        let mut found = Vec::new();
        let mut stack = vec![self.index];
        while let Some(index) = stack.pop() {
            let node = &self.frame.nodes[index];
            if node.attributes.view_id.as_deref() == Some(view_id) {
                found.push(self.at(index));
            }
            // reversed so the walk stays in document order
            stack.extend(node.children.iter().rev());
        }
        Ok(found)
    }

    fn click(&self) -> Result<(), AutomationError> {
        if !self.node().attributes.is_clickable {
            return Err(AutomationError::ActionFailed(format!(
                "node {:?} is not clickable",
                self.node().attributes.view_id
            )));
        }
        self.perform(ActionKind::Click)
    }

    fn long_click(&self) -> Result<(), AutomationError> {
        self.perform(ActionKind::LongClick)
    }

    fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        if !self.node().attributes.is_editable {
            return Err(AutomationError::ActionFailed(format!(
                "node {:?} is not editable",
                self.node().attributes.view_id
            )));
        }
        self.perform(ActionKind::SetText(text.to_string()))
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}

/// Small builder for hand-written trees
pub mod tree {
    use crate::element::SerializableUIElement;

    pub fn node(class_name: &str) -> SerializableUIElement {
        SerializableUIElement::new(class_name)
    }

    pub fn with_id(class_name: &str, view_id: &str) -> SerializableUIElement {
        let mut n = node(class_name);
        n.view_id = Some(view_id.to_string());
        n
    }

    pub fn button(view_id: &str) -> SerializableUIElement {
        let mut n = with_id("android.widget.Button", view_id);
        n.clickable = true;
        n
    }

    pub fn edit_text(view_id: &str) -> SerializableUIElement {
        let mut n = with_id("android.widget.EditText", view_id);
        n.clickable = true;
        n.editable = true;
        n
    }

    pub fn text_view(view_id: &str, text: &str) -> SerializableUIElement {
        let mut n = with_id("android.widget.TextView", view_id);
        n.text = Some(text.to_string());
        n
    }

    pub fn layout(children: Vec<SerializableUIElement>) -> SerializableUIElement {
        let mut n = node("android.widget.FrameLayout");
        n.children = children;
        n
    }

    pub fn clickable(mut n: SerializableUIElement) -> SerializableUIElement {
        n.clickable = true;
        n
    }

    pub fn selected(mut n: SerializableUIElement) -> SerializableUIElement {
        n.selected = true;
        n
    }
}
