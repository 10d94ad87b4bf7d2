use engine::core::action::{Action, ActionContext, ActionStatus};
use engine::test_support::TestWorkspace;
use serde_json::{Value, json};

fn actions(value: Value) -> Vec<Action> {
    serde_json::from_value(value).expect("actions")
}

#[test]
fn create_edit_and_empty_a_file() {
    let ws = TestWorkspace::new();
    assert!(ws.run("CreateFolder", json!({ "path": "demo" })).is_success());
    assert!(ws.run("CreateFile", json!({ "path": "demo/app.py", "content": "print(1)" })).is_success());
    let result = ws.run("DeleteLineRange", json!({ "path": "demo/app.py", "start_line": 1, "end_line": 1 }));
    assert!(result.is_success(), "{result:?}");
    assert_eq!(ws.read("demo/app.py"), "");
    assert!(!ws.path(".engine_backup").exists());
}

#[test]
fn atomic_failure_restores_pre_dispatch_state() {
    let ws = TestWorkspace::new();
    let plan = actions(json!([
        { "type": "CreateFolder", "params": { "path": "demo" } },
        { "type": "CreateFile", "params": { "path": "demo/app.py", "content": "print(1)" } },
        { "type": "DeleteLineRange", "params": { "path": "demo/app.py", "start_line": 5, "end_line": 9 } },
    ]));
    let result = ws.supervisor.dispatch_batch(&plan, true, &ActionContext::default());
    assert_eq!(result.status, ActionStatus::Failure);
    assert_eq!(result.sub_results.len(), 3);
    assert!(!ws.path("demo").exists());
    assert!(!ws.path("demo/app.py").exists());
}

#[test]
fn batch_keeps_earlier_effects_and_reports_partial() {
    let ws = TestWorkspace::new();
    let plan = actions(json!([
        { "type": "CreateFolder", "params": { "path": "demo" } },
        { "type": "CreateFile", "params": { "path": "demo/app.py", "content": "print(1)" } },
        { "type": "DeleteLineRange", "params": { "path": "demo/app.py", "start_line": 5, "end_line": 9 } },
    ]));
    let result = ws.supervisor.dispatch_batch(&plan, false, &ActionContext::default());
    assert_eq!(result.status, ActionStatus::Partial);
    assert_eq!(result.message, "Batch operation completed: 2 succeeded, 1 failed");
    assert_eq!(ws.read("demo/app.py"), "print(1)");
}

#[test]
fn atomic_rollback_restores_edited_and_deleted_files() {
    let ws = TestWorkspace::new();
    ws.write("keep.txt", "original\n");
    ws.write("gone.txt", "still here\n");
    let plan = actions(json!([
        { "type": "RewriteEntireFile", "params": { "path": "keep.txt", "content": "changed\n" } },
        { "type": "DeleteFile", "params": { "path": "gone.txt" } },
        { "type": "ReplaceText", "params": { "path": "keep.txt", "old_text": "absent", "new_text": "x" } },
    ]));
    let result = ws.supervisor.dispatch_batch(&plan, true, &ActionContext::default());
    assert!(result.is_failure());
    assert_eq!(ws.read("keep.txt"), "original\n");
    assert_eq!(ws.read("gone.txt"), "still here\n");
    assert!(!ws.path(".engine_backup").exists());
}

#[test]
fn insert_then_delete_restores_content() {
    let ws = TestWorkspace::new();
    let original = "alpha\nbeta\ngamma\n";
    ws.write("notes.txt", original);
    let inserted = ws.run("InsertAfterLine", json!({ "path": "notes.txt", "line_number": 2, "text": "one\ntwo" }));
    assert!(inserted.is_success(), "{inserted:?}");
    assert_eq!(ws.read("notes.txt"), "alpha\nbeta\none\ntwo\ngamma\n");
    let deleted = ws.run("DeleteLineRange", json!({ "path": "notes.txt", "start_line": 3, "end_line": 4 }));
    assert!(deleted.is_success(), "{deleted:?}");
    assert_eq!(ws.read("notes.txt"), original);
}

#[test]
fn update_json_key_adds_nested_key() {
    let ws = TestWorkspace::new();
    ws.write("cfg.json", r#"{"a":{"b":1}}"#);
    let result = ws.run("UpdateJSONKey", json!({ "path": "cfg.json", "key_path": "a.c", "value": 42 }));
    assert!(result.is_success(), "{result:?}");
    let parsed: Value = serde_json::from_str(&ws.read("cfg.json")).expect("json");
    assert_eq!(parsed, json!({ "a": { "b": 1, "c": 42 } }));
}

#[test]
fn fuzzy_miss_leaves_file_untouched_and_reports_score() {
    let ws = TestWorkspace::new();
    ws.write("m.py", "def compute():\n    return 1\n");
    let result = ws.run(
        "ReplaceByFuzzyMatch",
        json!({ "path": "m.py", "target": "zzzzzzzzzzzzzz", "replacement": "x", "threshold": 0.9 }),
    );
    assert!(result.is_failure());
    assert!(result.error.expect("error").contains("best score"));
    assert_eq!(ws.read("m.py"), "def compute():\n    return 1\n");
}

#[test]
fn delete_range_errors_are_distinguishable() {
    let ws = TestWorkspace::new();
    ws.write("f.txt", "a\nb\nc\n");
    let inverted = ws.run("DeleteLineRange", json!({ "path": "f.txt", "start_line": 3, "end_line": 1 }));
    let out_of_bounds = ws.run("DeleteLineRange", json!({ "path": "f.txt", "start_line": 2, "end_line": 7 }));
    let inverted = inverted.error.expect("error");
    let out_of_bounds = out_of_bounds.error.expect("error");
    assert!(inverted.contains("must be >="));
    assert!(out_of_bounds.contains("out of bounds"));
    assert_eq!(ws.read("f.txt"), "a\nb\nc\n");
}

#[test]
fn view_relative_paths_follow_change_directory() {
    let ws = TestWorkspace::new();
    ws.write("demo/readme.md", "hi\n");
    ws.supervisor.change_directory("demo").expect("cd demo");
    let created = ws.run("CreateFile", json!({ "path": "app.py", "content": "x = 1\n" }));
    assert!(created.is_success());
    assert_eq!(ws.read("demo/app.py"), "x = 1\n");
    // Root-relative form of an existing file still resolves.
    let read = ws.run("ReadFile", json!({ "path": "demo/readme.md" }));
    assert_eq!(read.data.expect("data")["content"], "hi\n");
}

#[test]
fn dry_run_touches_nothing() {
    let ws = TestWorkspace::new();
    let action = Action::new("CreateFile", json!({ "path": "x.txt", "content": "x" }));
    let result = ws.supervisor.dispatch(&action, &ActionContext::dry_run());
    assert_eq!(result.status, ActionStatus::DryRun);
    assert!(!ws.path("x.txt").exists());
}
