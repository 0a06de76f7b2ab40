//! Ready-made workflows for the bundled catalog.

use crate::catalog::keys;
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::poller::{PollSpec, DEFAULT_PERIOD, DEFAULT_TIMEOUT};
use crate::workflow::{
    policy_fn, Judgement, NodeAction, NodePick, PageInfo, PageTransition, RequireEditable,
    SkipIfSelected, WorkflowBuilder,
};
use crate::Automation;
use std::time::Duration;
use tracing::info;

/// Pages used by the recipes
pub mod pages {
    pub const HOME: &str = "home";
    pub const SEARCH: &str = "search";
    pub const SEARCH_RESULTS: &str = "search_results";
    pub const CHAT: &str = "chat";
    pub const COMPOSED: &str = "composed";
    pub const SENT: &str = "sent";
    pub const CONTACTS: &str = "contacts";
}

/// Pause before acting on a freshly opened page
pub const PAGE_SETTLE: Duration = Duration::from_millis(300);

/// Search `contact` from the home page, open the chat and send `message`
pub fn search_and_send(contact: &str, message: &str) -> WorkflowBuilder {
    let wanted = contact.to_string();
    let pick_contact = policy_fn("contact-by-name", move |matches: Vec<UIElement>| {
        let named: Vec<UIElement> = matches
            .into_iter()
            .filter(|n| n.text().as_deref() == Some(wanted.as_str()))
            .collect();
        Ok(if named.is_empty() {
            Judgement::NotYet
        } else {
            Judgement::Act(named)
        })
    });

    WorkflowBuilder::new("search-and-send")
        .page(pages::HOME, PageInfo::new("home").class_name("com.tencent.mm.ui.LauncherUI"))
        .page(
            pages::SEARCH,
            PageInfo::new("search").class_name("com.tencent.mm.plugin.fts.ui.FTSMainUI"),
        )
        .page(pages::SEARCH_RESULTS, PageInfo::new("search results"))
        .page(pages::CHAT, PageInfo::new("chat").class_name("com.tencent.mm.ui.chatting.ChattingUI"))
        .page(pages::COMPOSED, PageInfo::new("chat with draft"))
        .page(pages::SENT, PageInfo::new("message sent"))
        .step(PageTransition::new(pages::HOME, keys::HOME_SEARCH_BUTTON, pages::SEARCH))
        .step(
            PageTransition::new(pages::SEARCH, keys::SEARCH_EDIT_TEXT, pages::SEARCH_RESULTS)
                .action(NodeAction::SetText(contact.to_string()))
                .policy(RequireEditable)
                .pick(NodePick::Last)
                .settle(PAGE_SETTLE),
        )
        .step(
            PageTransition::new(pages::SEARCH_RESULTS, keys::SEARCH_FRIEND_RESULT, pages::CHAT)
                .policy(pick_contact)
                .settle(PAGE_SETTLE),
        )
        .step(
            PageTransition::new(pages::CHAT, keys::CHAT_EDIT_TEXT, pages::COMPOSED)
                .action(NodeAction::SetText(message.to_string()))
                .near(keys::CHAT_BOTTOM_ROOT, 2)
                .policy(RequireEditable)
                .pick(NodePick::Last)
                .settle(PAGE_SETTLE),
        )
        .step(PageTransition::new(pages::COMPOSED, keys::CHAT_SEND_BUTTON, pages::SENT))
}

/// Switch the home page to the contacts tab unless it is already showing
pub fn open_contacts_tab() -> WorkflowBuilder {
    WorkflowBuilder::new("open-contacts")
        .page(pages::HOME, PageInfo::new("home"))
        .page(pages::CONTACTS, PageInfo::new("contacts tab"))
        .step(
            PageTransition::new(pages::HOME, keys::HOME_TAB_CONTACTS, pages::CONTACTS)
                .policy(SkipIfSelected),
        )
}

/// Wait until the home page of the app is on screen. Launching is slow, so
/// the default timeout is doubled.
pub async fn wait_for_home(automation: &Automation) -> Result<(), AutomationError> {
    let spec = PollSpec::new(DEFAULT_TIMEOUT, DEFAULT_PERIOD, "wait for home page")?.scaled(2);
    let found = automation.wait_for(keys::HOME_BOTTOM_NAV, &spec).await.into_result()?;
    info!(nodes = found.len(), "Home page is showing");
    Ok(())
}
