use super::init_tracing;
use crate::element::{UIElementAttributes, UIElementImpl};
use crate::platforms::memory::{tree, MemoryEngine};
use crate::registry::{LocatorEntry, VersionedNodeRegistry};
use crate::{AccessibilityEngine, AutomationError, NodeLocator, NodeQuery, UIElement};

fn sample_tree() -> crate::SerializableUIElement {
    let mut row = tree::with_id("android.widget.LinearLayout", "row");
    row.children.push(tree::text_view("label", "Alice"));
    tree::layout(vec![row, tree::button("target")])
}

fn label_of(root: &UIElement) -> UIElement {
    root.find_by_view_id("label").unwrap().remove(0)
}

/// A node with no children whose `parent` must never be asked for
#[derive(Debug, Clone)]
struct SealedNode;

impl UIElementImpl for SealedNode {
    fn object_id(&self) -> usize {
        1
    }

    fn view_id(&self) -> Option<String> {
        Some("sealed".to_string())
    }

    fn class_name(&self) -> String {
        "android.view.View".to_string()
    }

    fn attributes(&self) -> UIElementAttributes {
        UIElementAttributes {
            class_name: self.class_name(),
            view_id: self.view_id(),
            ..Default::default()
        }
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        Ok(Vec::new())
    }

    fn parent(&self) -> Result<Option<UIElement>, AutomationError> {
        panic!("parent() must not be called with max_depth = 0");
    }

    fn find_by_view_id(&self, _view_id: &str) -> Result<Vec<UIElement>, AutomationError> {
        Ok(Vec::new())
    }

    fn click(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    fn long_click(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    fn set_text(&self, _text: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}

#[test]
fn test_find_upward_depth_zero_never_visits_parent() {
    let start = UIElement::new(Box::new(SealedNode));
    let found = NodeLocator::new().find_upward(&start, "anything", 0);
    assert!(found.is_empty());
}

#[test]
fn test_find_upward_respects_depth() {
    init_tracing();
    let engine = MemoryEngine::new("1.0", sample_tree());
    let root = engine.root_element().unwrap();
    let label = label_of(&root);
    let locator = NodeLocator::new();

    assert!(locator.find_upward(&label, "target", 0).is_empty());
    assert!(locator.find_upward(&label, "target", 1).is_empty());

    let found = locator.find_upward(&label, "target", 2);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].view_id().as_deref(), Some("target"));
}

#[test]
fn test_find_upward_includes_start_itself() {
    let engine = MemoryEngine::new("1.0", sample_tree());
    let root = engine.root_element().unwrap();
    let label = label_of(&root);

    let found = NodeLocator::new().find_upward(&label, "label", 0);
    assert_eq!(found, vec![label]);
}

#[test]
fn test_find_upward_stops_at_root() {
    let engine = MemoryEngine::new("1.0", sample_tree());
    let root = engine.root_element().unwrap();
    let label = label_of(&root);

    assert!(NodeLocator::new().find_upward(&label, "missing", 10).is_empty());
}

#[test]
fn test_find_with_retry_without_root() {
    assert!(NodeLocator::new().find_with_retry(None, "target", 3).is_empty());
}

#[test]
fn test_find_with_retry_zero_lookups() {
    let engine = MemoryEngine::new("1.0", sample_tree());
    let root = engine.root_element();
    let locator = NodeLocator::new();

    assert!(locator.find_with_retry(root.as_ref(), "target", 0).is_empty());
    assert_eq!(locator.find_with_retry(root.as_ref(), "target", 1).len(), 1);
}

#[test]
fn test_stale_root_yields_empty_or_error() {
    let engine = MemoryEngine::new("1.0", sample_tree());
    let root = engine.root_element().unwrap();
    engine.replace_tree(Some(sample_tree()));
    let locator = NodeLocator::new();

    assert!(locator.find_with_retry(Some(&root), "target", 3).is_empty());
    assert!(locator.find_upward(&root, "target", 2).is_empty());

    let err = locator.find(&root, "target").unwrap_err();
    assert!(err.is_structural(), "{err:?}");
    let err = locator
        .search(Some(&root), &NodeQuery::downward("target"))
        .unwrap_err();
    assert!(matches!(err, AutomationError::ElementDetached(_)));
}

#[test]
fn test_search_dispatches_on_direction() {
    let engine = MemoryEngine::new("1.0", sample_tree());
    let root = engine.root_element().unwrap();
    let label = label_of(&root);
    let locator = NodeLocator::new();

    let up = locator
        .search(Some(&label), &NodeQuery::upward("target", 2))
        .unwrap();
    assert_eq!(up.len(), 1);

    let down = locator
        .search(Some(&label), &NodeQuery::downward("target").with_bound(5))
        .unwrap();
    assert!(down.is_empty());

    assert!(locator
        .search(None, &NodeQuery::downward("target"))
        .unwrap()
        .is_empty());
}

#[test]
fn test_resolve_filters_by_whole_text() {
    let buttons = tree::layout(vec![
        tree::text_view("btn", "OK"),
        tree::text_view("btn", "Cancel"),
        tree::text_view("btn", "OKAY"),
        tree::with_id("android.widget.Button", "btn"),
    ]);
    let engine = MemoryEngine::new("1.0", buttons);
    let root = engine.root_element();
    let registry = VersionedNodeRegistry::builder()
        .register("1.0", "dialog.confirm", LocatorEntry::id("btn").text("OK|Send"))
        .locator("1.0", "dialog.any", "btn")
        .build()
        .unwrap();
    let set = registry.resolve("1.0").unwrap();
    let locator = NodeLocator::new();
    let query = NodeQuery::downward("btn");

    let confirm = locator
        .resolve(root.as_ref(), &query, set.get("dialog.confirm").unwrap())
        .unwrap();
    assert_eq!(confirm.len(), 1);
    assert_eq!(confirm[0].text().as_deref(), Some("OK"));

    let any = locator
        .resolve(root.as_ref(), &query, set.get("dialog.any").unwrap())
        .unwrap();
    assert_eq!(any.len(), 4);
}
