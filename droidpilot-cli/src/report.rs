use colored::*;
use droidpilot::platforms::memory::{ActionKind, ActionRecord};
use droidpilot::{VersionedNodeRegistry, WorkflowOutcome};
use serde_json::{json, Value};

pub fn print_versions(registry: &VersionedNodeRegistry) {
    println!("{}", "Locator table".bold());
    for version in registry.versions() {
        let count = registry.resolve(version).map(|set| set.len()).unwrap_or_default();
        println!("  {} {} ({} keys)", "•".dimmed(), version.cyan(), count);
    }
}

pub fn print_valid(checked: usize) {
    if checked == 0 {
        println!("{} Table loaded", "✅".green());
    } else {
        println!(
            "{} Every version defines all {} requested keys",
            "✅".green(),
            checked
        );
    }
}

pub fn print_missing(missing: &[(String, String)]) {
    println!("{} Missing locators:", "❌".red());
    for (version, key) in missing {
        println!("  {} {}", version.yellow(), key.red());
    }
}

fn describe(action: &ActionRecord) -> String {
    let target = action.view_id.as_deref().unwrap_or("-");
    match &action.kind {
        ActionKind::Click => format!("click {target}"),
        ActionKind::LongClick => format!("long click {target}"),
        ActionKind::SetText(text) => format!("type {text:?} into {target}"),
        ActionKind::Global(action) => format!("global {action}"),
    }
}

pub fn print_outcome(outcome: &WorkflowOutcome, actions: &[ActionRecord]) {
    for step in outcome.steps() {
        println!(
            "  {} {} -> {} via {} ({:?}, {} attempts, {}ms)",
            "✓".green(),
            step.from,
            step.to,
            step.key.as_str().cyan(),
            step.resolution,
            step.attempts,
            step.elapsed.as_millis()
        );
    }
    match outcome {
        WorkflowOutcome::Completed { final_page, .. } => {
            println!("{} Reached page {}", "✅".green(), final_page.as_str().bold());
        }
        WorkflowOutcome::Failed { failure, .. } => {
            println!("{} {}", "❌".red(), failure.to_string().red());
        }
    }
    if !actions.is_empty() {
        println!("{}", "Actions".bold());
        for action in actions {
            println!("  {} {}", "→".dimmed(), describe(action));
        }
    }
}

pub fn summary(outcome: &WorkflowOutcome, actions: &[ActionRecord]) -> Value {
    let steps: Vec<Value> = outcome
        .steps()
        .iter()
        .map(|step| {
            json!({
                "from": step.from.as_str(),
                "to": step.to.as_str(),
                "key": step.key.as_str(),
                "resolution": format!("{:?}", step.resolution).to_lowercase(),
                "attempts": step.attempts,
                "elapsed_ms": step.elapsed.as_millis() as u64,
            })
        })
        .collect();
    let actions: Vec<String> = actions.iter().map(describe).collect();

    match outcome {
        WorkflowOutcome::Completed { final_page, .. } => json!({
            "status": "success",
            "final_page": final_page.as_str(),
            "steps": steps,
            "actions": actions,
        }),
        WorkflowOutcome::Failed { failure, .. } => json!({
            "status": "error",
            "failure": {
                "page": failure.page.as_str(),
                "key": failure.key.as_ref().map(|k| k.as_str()),
                "kind": failure.kind.to_string(),
                "attempts": failure.attempts,
                "elapsed_ms": failure.elapsed.as_millis() as u64,
                "message": failure.message,
            },
            "steps": steps,
            "actions": actions,
        }),
    }
}
