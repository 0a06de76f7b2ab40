//! Bundled locator table and the logical keys it defines.

use crate::errors::AutomationError;
use crate::registry::VersionedNodeRegistry;

/// Raw YAML of the bundled messaging-app table
pub const WECHAT_TABLE: &str = include_str!("../catalog/wechat.yaml");

/// Logical keys used by the bundled recipes
pub mod keys {
    pub const HOME_BOTTOM_NAV: &str = "home.bottom_nav";
    pub const HOME_TAB_CONTACTS: &str = "home.tab.contacts";
    pub const HOME_SEARCH_BUTTON: &str = "home.search.button";
    pub const SEARCH_EDIT_TEXT: &str = "search.edit_text";
    pub const SEARCH_FRIEND_RESULT: &str = "search.friend.result";
    pub const CHAT_BOTTOM_ROOT: &str = "chat.bottom.root";
    pub const CHAT_EDIT_TEXT: &str = "chat.edit_text";
    pub const CHAT_SEND_BUTTON: &str = "chat.send.button";
}

/// Parse the bundled table
pub fn wechat() -> Result<VersionedNodeRegistry, AutomationError> {
    VersionedNodeRegistry::from_yaml_str(WECHAT_TABLE)
}
