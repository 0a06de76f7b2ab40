use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Represents a node in the live accessibility tree of the target application
#[derive(Debug)]
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

/// Serializable snapshot of a UIElement, used for tree dumps and recorded trees
///
/// Note: This struct only contains the node's properties and cannot perform
/// any actions. To interact with the node you need a live UIElement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SerializableUIElement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub view_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clickable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializableUIElement>,
}

impl From<&UIElement> for SerializableUIElement {
    fn from(element: &UIElement) -> Self {
        let attrs = element.attributes();
        Self {
            class_name: attrs.class_name,
            view_id: attrs.view_id,
            text: attrs.text,
            description: attrs.description,
            clickable: attrs.is_clickable,
            selected: attrs.is_selected,
            checked: attrs.is_checked,
            editable: attrs.is_editable,
            children: Vec::new(),
        }
    }
}

impl SerializableUIElement {
    /// Create a new SerializableUIElement with only a class name
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Create from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Attributes associated with a node
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct UIElementAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub view_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_clickable: bool,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub is_checked: bool,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
}

impl fmt::Debug for UIElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UIElementAttributes");

        if !self.class_name.is_empty() {
            debug_struct.field("class_name", &self.class_name);
        }
        if let Some(ref view_id) = self.view_id {
            debug_struct.field("view_id", view_id);
        }
        if let Some(ref text) = self.text {
            if !text.is_empty() {
                debug_struct.field("text", text);
            }
        }
        if let Some(ref description) = self.description {
            if !description.is_empty() {
                debug_struct.field("description", description);
            }
        }

        // Flags only show up when set
        for (name, flag) in [
            ("is_clickable", self.is_clickable),
            ("is_selected", self.is_selected),
            ("is_checked", self.is_checked),
            ("is_editable", self.is_editable),
        ] {
            if flag {
                debug_struct.field(name, &true);
            }
        }

        if let Some(count) = self.child_count {
            debug_struct.field("child_count", &count);
        }

        debug_struct.finish()
    }
}

/// Interface for platform-specific node implementations
///
/// `find_by_view_id` is the node query primitive: it returns every descendant
/// (inclusive of the node itself) carrying the given view id, and reports
/// [`AutomationError::ElementDetached`] when the reference went stale.
pub trait UIElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    fn view_id(&self) -> Option<String>;
    fn class_name(&self) -> String;
    fn attributes(&self) -> UIElementAttributes;
    fn text(&self) -> Option<String> {
        self.attributes().text
    }
    fn children(&self) -> Result<Vec<UIElement>, AutomationError>;
    fn parent(&self) -> Result<Option<UIElement>, AutomationError>;
    fn find_by_view_id(&self, view_id: &str) -> Result<Vec<UIElement>, AutomationError>;
    fn click(&self) -> Result<(), AutomationError>;
    fn long_click(&self) -> Result<(), AutomationError>;
    fn set_text(&self, text: &str) -> Result<(), AutomationError>;
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
}

impl UIElement {
    /// Create a new UI element from a platform-specific implementation
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    /// Get the platform view id (e.g. `com.example:id/send`)
    pub fn view_id(&self) -> Option<String> {
        self.inner.view_id()
    }

    pub fn class_name(&self) -> String {
        self.inner.class_name()
    }

    /// Get all attributes of the element
    pub fn attributes(&self) -> UIElementAttributes {
        self.inner.attributes()
    }

    pub fn text(&self) -> Option<String> {
        self.inner.text()
    }

    pub fn is_clickable(&self) -> bool {
        self.attributes().is_clickable
    }

    pub fn is_selected(&self) -> bool {
        self.attributes().is_selected
    }

    pub fn is_checked(&self) -> bool {
        self.attributes().is_checked
    }

    pub fn is_editable(&self) -> bool {
        self.attributes().is_editable
    }

    /// Get child elements
    pub fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.children()
    }

    /// Get parent element
    pub fn parent(&self) -> Result<Option<UIElement>, AutomationError> {
        self.inner.parent()
    }

    /// Query descendants by view id
    pub fn find_by_view_id(&self, view_id: &str) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.find_by_view_id(view_id)
    }

    /// Click on this element
    #[instrument(level = "debug", skip(self), fields(node = %utils::element_identifier(self)))]
    pub fn click(&self) -> Result<(), AutomationError> {
        self.inner.click()
    }

    /// Click this element, or its closest clickable ancestor when the element
    /// itself does not accept clicks (labels inside list rows, tab icons).
    pub fn click_nearest_clickable(&self) -> Result<(), AutomationError> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.is_clickable() {
                if node != *self {
                    debug!(
                        "Delegating click from {} to ancestor {}",
                        utils::element_identifier(self),
                        utils::element_identifier(&node)
                    );
                }
                return node.click();
            }
            current = node.parent()?;
        }
        Err(AutomationError::ActionFailed(format!(
            "no clickable node at or above {}",
            utils::element_identifier(self)
        )))
    }

    #[instrument(level = "debug", skip(self), fields(node = %utils::element_identifier(self)))]
    pub fn long_click(&self) -> Result<(), AutomationError> {
        self.inner.long_click()
    }

    /// Replace the text content of an editable element
    #[instrument(level = "debug", skip(self, text), fields(node = %utils::element_identifier(self)))]
    pub fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.set_text(text)
    }

    pub fn to_serializable(&self) -> SerializableUIElement {
        SerializableUIElement::from(self)
    }

    /// Snapshot this element and its descendants down to `max_depth` levels.
    /// Subtrees that fail to load (stale references) are left out.
    pub fn to_serializable_tree(&self, max_depth: usize) -> SerializableUIElement {
        fn build(element: &UIElement, depth: usize, max_depth: usize) -> SerializableUIElement {
            let mut serializable = element.to_serializable();
            if depth < max_depth {
                if let Ok(children) = element.children() {
                    serializable.children = children
                        .iter()
                        .map(|child| build(child, depth + 1, max_depth))
                        .collect();
                }
            }
            serializable
        }
        build(self, 0, max_depth)
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for UIElement {}

impl std::hash::Hash for UIElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.object_id().hash(state);
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

/// Utility functions for working with UI elements
pub mod utils {
    use super::*;

    /// Get a human-readable identifier for the element
    pub fn element_identifier(element: &UIElement) -> String {
        match (element.view_id(), element.text()) {
            (Some(id), Some(text)) if !text.is_empty() => format!("{id} '{text}'"),
            (Some(id), _) => id,
            (None, Some(text)) if !text.is_empty() => {
                format!("'{}' ({})", text, element.class_name())
            }
            _ => element.class_name(),
        }
    }
}
