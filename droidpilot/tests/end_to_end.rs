use droidpilot::platforms::memory::{tree, ActionKind, MemoryEngine};
use droidpilot::workflow::StepResolution;
use droidpilot::{
    Automation, Outcome, PageTransition, PageWorkflow, PollSpec, SerializableUIElement,
    VersionedNodeRegistry,
};
use std::sync::Arc;
use std::time::Duration;

fn registry() -> Arc<VersionedNodeRegistry> {
    Arc::new(
        VersionedNodeRegistry::builder()
            .locator("1.0", "send.button", "id/send_v1")
            .locator("2.0", "send.button", "id/send_v2")
            .build()
            .expect("valid table"),
    )
}

/// Two renders without the send button, then one with it. An old-release
/// button stays on screen the whole time.
fn frames() -> Vec<Option<SerializableUIElement>> {
    let loading = || tree::layout(vec![tree::button("id/send_v1")]);
    vec![
        Some(loading()),
        Some(loading()),
        Some(tree::layout(vec![
            tree::button("id/send_v1"),
            tree::button("id/send_v2"),
        ])),
    ]
}

fn timing() -> PollSpec {
    PollSpec::new(
        Duration::from_millis(1000),
        Duration::from_millis(200),
        "send",
    )
    .expect("valid timing")
}

#[tokio::test(start_paused = true)]
async fn test_send_step_uses_running_version_ids() {
    let engine = MemoryEngine::scripted("2.0", frames());
    let automation = Automation::new(Arc::new(engine.clone()), registry());
    let workflow = automation
        .workflow(
            PageWorkflow::builder("send")
                .step(PageTransition::new("compose", "send.button", "sent").timing(timing())),
        )
        .expect("workflow builds");

    let outcome = workflow.run("compose").await;

    assert!(outcome.is_completed(), "{outcome:?}");
    let step = &outcome.steps()[0];
    assert_eq!(step.resolution, StepResolution::Acted);
    assert_eq!(step.attempts, 3);
    assert!(step.elapsed >= Duration::from_millis(400));
    assert!(step.elapsed < Duration::from_millis(1000));

    let actions = engine.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, ActionKind::Click);
    assert_eq!(actions[0].view_id.as_deref(), Some("id/send_v2"));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_reports_success_on_third_attempt() {
    let engine = MemoryEngine::scripted("2.0", frames());
    let automation = Automation::new(Arc::new(engine.clone()), registry());

    match automation.wait_for("send.button", &timing()).await {
        Outcome::Success {
            value, attempts, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(value.len(), 1);
            assert_eq!(value[0].view_id().as_deref(), Some("id/send_v2"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_old_release_clicks_old_id_immediately() {
    let engine = MemoryEngine::scripted("1.0", frames());
    let automation = Automation::new(Arc::new(engine.clone()), registry());
    let workflow = automation
        .workflow(
            PageWorkflow::builder("send")
                .step(PageTransition::new("compose", "send.button", "sent").timing(timing())),
        )
        .expect("workflow builds");

    let outcome = workflow.run("compose").await;

    assert_eq!(outcome.steps()[0].attempts, 1);
    assert_eq!(engine.actions()[0].view_id.as_deref(), Some("id/send_v1"));
}
