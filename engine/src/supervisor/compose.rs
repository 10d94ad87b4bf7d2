//! BatchOperation and AtomicOperation.
//!
//! A batch dispatches every sub-action on its own, so each one commits or
//! rolls back independently. An atomic group runs every sub-action in the
//! caller's transaction and stops at the first result that is not a success;
//! the enclosing dispatch then rolls the whole group back.

use anyhow::Result;
use serde_json::json;
use tracing::{debug, warn};

use crate::core::action::{Action, ActionContext, ActionKind, ActionResult, Params};
use crate::io::transaction::Transaction;

use super::ActionSupervisor;

pub(super) fn run_batch(sup: &ActionSupervisor, actions: &[Action], ctx: &ActionContext) -> ActionResult {
    if actions.is_empty() {
        return ActionResult::failure("No actions provided", "Empty batch");
    }
    let results: Vec<ActionResult> = actions.iter().map(|action| sup.dispatch(action, ctx)).collect();
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let failed = results.iter().filter(|r| r.is_failure()).count();
    debug!(succeeded, failed, "batch finished");

    let message = format!("Batch operation completed: {succeeded} succeeded, {failed} failed");
    let result = if failed == 0 {
        ActionResult::success(message)
    } else if succeeded > 0 {
        ActionResult::partial(message)
    } else {
        ActionResult::failure(message, format!("{failed} action(s) failed"))
    };
    result
        .with_data(json!({ "total": results.len(), "succeeded": succeeded, "failed": failed }))
        .with_sub_results(results)
}

pub(super) fn run_atomic(
    sup: &ActionSupervisor,
    actions: &[Action],
    ctx: &ActionContext,
    tx: &mut Transaction,
) -> ActionResult {
    if actions.is_empty() {
        return ActionResult::failure("No actions provided", "Empty atomic operation");
    }
    if let Some(nested) = nested_group(actions) {
        return ActionResult::failure(
            format!("Nested {nested} is not supported inside an atomic operation"),
            "Nested group operation",
        );
    }
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        let result = match action.kind.trim().parse::<ActionKind>() {
            Ok(kind) => sup.execute(kind, action.params(), ctx, tx),
            Err(err) => ActionResult::failure(format!("Unknown action type: {}", action.kind), err.to_string()),
        };
        let ok = result.is_success();
        results.push(result);
        if !ok {
            warn!(action = %action.kind, index = results.len() - 1, "atomic group stopped");
            return ActionResult::failure(
                "Atomic operation failed, all changes will be rolled back",
                format!("Failed at action: {}", action.kind),
            )
            .with_sub_results(results);
        }
    }
    ActionResult::success(format!("Atomic operation completed: {} actions succeeded", results.len()))
        .with_data(json!({ "total": results.len() }))
        .with_sub_results(results)
}

/// First group kind in `actions`. A batch commits per action, outside the shared transaction.
fn nested_group(actions: &[Action]) -> Option<ActionKind> {
    actions
        .iter()
        .filter_map(|a| a.kind.trim().parse::<ActionKind>().ok())
        .find(|kind| matches!(kind, ActionKind::BatchOperation | ActionKind::AtomicOperation))
}

pub(super) fn batch_operation(
    sup: &ActionSupervisor,
    params: Params<'_>,
    ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let actions = params.actions(&["actions"])?;
    Ok(run_batch(sup, &actions, ctx))
}

pub(super) fn atomic_operation(
    sup: &ActionSupervisor,
    params: Params<'_>,
    ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let actions = params.actions(&["actions"])?;
    Ok(run_atomic(sup, &actions, ctx, tx))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::core::action::ActionStatus;
    use crate::io::config::EngineConfig;

    fn setup() -> (tempfile::TempDir, ActionSupervisor) {
        let temp = tempfile::tempdir().expect("tempdir");
        let sup = ActionSupervisor::new(temp.path(), EngineConfig::default()).expect("supervisor");
        (temp, sup)
    }

    fn create(path: &str) -> serde_json::Value {
        json!({ "type": "CreateFile", "params": { "path": path, "content": "x" } })
    }

    #[test]
    fn batch_with_mixed_outcomes_is_partial_and_keeps_successes() {
        let (temp, sup) = setup();
        let action = Action::new(
            "BatchOperation",
            json!({ "actions": [create("a.txt"), { "type": "ReadFile", "params": { "path": "missing.txt" } }] }),
        );
        let result = sup.dispatch(&action, &ActionContext::default());
        assert_eq!(result.status, ActionStatus::Partial);
        assert_eq!(result.message, "Batch operation completed: 1 succeeded, 1 failed");
        assert_eq!(result.sub_results.len(), 2);
        assert!(temp.path().join("a.txt").exists());
    }

    #[test]
    fn atomic_failure_rolls_back_earlier_steps() {
        let (temp, sup) = setup();
        let action = Action::new(
            "AtomicOperation",
            json!({ "actions": [create("a.txt"), create("b.txt"), { "type": "DeleteFile", "params": { "path": "nope.txt" } }] }),
        );
        let result = sup.dispatch(&action, &ActionContext::default());
        assert_eq!(result.status, ActionStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("Failed at action: DeleteFile"));
        assert_eq!(result.sub_results.len(), 3);
        assert!(!temp.path().join("a.txt").exists());
        assert!(!temp.path().join("b.txt").exists());
    }

    #[test]
    fn atomic_success_commits_everything() {
        let (temp, sup) = setup();
        let actions: Vec<Action> =
            serde_json::from_value(json!([create("a.txt"), create("dir/b.txt")])).expect("actions");
        let result = sup.dispatch_batch(&actions, true, &ActionContext::default());
        assert!(result.is_success());
        assert_eq!(result.message, "Atomic operation completed: 2 actions succeeded");
        assert_eq!(fs::read_to_string(temp.path().join("dir/b.txt")).expect("read"), "x");
        assert!(!temp.path().join(".engine_backup").exists());
    }

    #[test]
    fn empty_groups_fail() {
        let (_temp, sup) = setup();
        let batch = sup.dispatch(&Action::new("BatchOperation", json!({ "actions": [] })), &ActionContext::default());
        assert_eq!(batch.error.as_deref(), Some("Empty batch"));
        let atomic = sup.dispatch(&Action::new("AtomicOperation", json!({ "actions": [] })), &ActionContext::default());
        assert_eq!(atomic.error.as_deref(), Some("Empty atomic operation"));
    }

    #[test]
    fn unknown_kind_inside_atomic_stops_the_group() {
        let (temp, sup) = setup();
        let action = Action::new(
            "AtomicOperation",
            json!({ "actions": [create("a.txt"), { "type": "Teleport", "params": {} }] }),
        );
        let result = sup.dispatch(&action, &ActionContext::default());
        assert!(result.is_failure());
        assert_eq!(result.sub_results[1].message, "Unknown action type: Teleport");
        assert!(!temp.path().join("a.txt").exists());
    }

    #[test]
    fn batch_inside_atomic_is_refused_before_anything_runs() {
        let (temp, sup) = setup();
        let action = Action::new(
            "AtomicOperation",
            json!({ "actions": [
                { "type": "BatchOperation", "params": { "actions": [create("a.txt")] } },
                { "type": "DeleteFile", "params": { "path": "missing.txt" } },
            ] }),
        );
        let result = sup.dispatch(&action, &ActionContext::default());
        assert!(result.is_failure());
        assert_eq!(
            result.message,
            "Nested BatchOperation is not supported inside an atomic operation"
        );
        assert!(!temp.path().join("a.txt").exists());

        let plan: Vec<Action> = serde_json::from_value(json!([
            { "type": "AtomicOperation", "params": { "actions": [create("b.txt")] } },
        ]))
        .expect("actions");
        let result = sup.dispatch_batch(&plan, true, &ActionContext::default());
        assert_eq!(result.error.as_deref(), Some("Nested group operation"));
        assert!(!temp.path().join("b.txt").exists());
    }
}
