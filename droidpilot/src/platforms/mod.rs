use crate::{AutomationError, UIElement};

pub mod memory;

/// System-level gestures that do not target a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalAction {
    Back,
}

impl std::fmt::Display for GlobalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlobalAction::Back => write!(f, "back"),
        }
    }
}

/// The common trait that platform adapters must implement
///
/// The core only ever asks for a fresh root, the running app's version and
/// global gestures. Node-level queries and actions go through [`UIElement`].
#[async_trait::async_trait]
pub trait AccessibilityEngine: Send + Sync {
    /// Get the root of the active window, `None` when no UI is attached
    fn root_element(&self) -> Option<UIElement>;

    /// Detect the version string of the automated application
    async fn app_version(&self) -> Result<String, AutomationError>;

    /// Perform a global gesture
    fn global_action(&self, action: GlobalAction) -> Result<(), AutomationError>;
}
