use engine::core::action::ActionStatus;
use engine::test_support::{TestWorkspace, git, init_repo};
use serde_json::json;

fn repo_with_commit() -> TestWorkspace {
    let ws = TestWorkspace::new();
    init_repo(ws.root());
    ws.write("README.md", "# demo\n");
    assert!(ws.run("GitAdd", json!({})).is_success());
    assert!(ws.run("GitCommit", json!({ "message": "initial" })).is_success());
    ws
}

#[test]
fn init_is_idempotent() {
    let ws = TestWorkspace::new();
    let first = ws.run("GitInit", json!({}));
    assert!(first.is_success(), "{first:?}");
    assert_eq!(first.message, "Git repository initialized");
    let second = ws.run("GitInit", json!({}));
    assert!(second.is_success());
    assert_eq!(second.message, "Git repository already initialized");
    assert_eq!(git(ws.root(), &["symbolic-ref", "--short", "HEAD"]), "main");
}

#[test]
fn actions_outside_a_repository_explain_themselves() {
    let ws = TestWorkspace::new();
    let add = ws.run("GitAdd", json!({}));
    assert_eq!(add.message, "Not in a git repository. Run GitInit first.");
    assert_eq!(add.error.as_deref(), Some("Missing .git"));
    let raw = ws.run("RunGitCommand", json!({ "command": "status" }));
    assert_eq!(raw.message, "Not in a git repository. Run 'git init' first.");
}

#[test]
fn commit_with_nothing_staged_is_a_no_op() {
    let ws = repo_with_commit();
    let again = ws.run("GitCommit", json!({ "message": "again" }));
    assert_eq!(again.status, ActionStatus::Success);
    assert_eq!(again.message, "No changes to commit.");
    assert_eq!(git(ws.root(), &["rev-list", "--count", "HEAD"]), "1");
}

#[test]
fn add_dot_skips_embedded_repositories() {
    let ws = TestWorkspace::new();
    init_repo(ws.root());
    ws.write("app.py", "print(1)\n");
    ws.write("lib/README", "x\n");
    init_repo(&ws.path("lib"));
    let result = ws.run("GitAdd", json!({ "files": "." }));
    assert!(result.is_success(), "{result:?}");
    let files = result.data.expect("data")["files"].clone();
    assert_eq!(files, json!(["app.py"]));
    let staged = git(ws.root(), &["diff", "--cached", "--name-only"]);
    assert_eq!(staged, "app.py");
}

#[test]
fn push_without_remote_is_refused() {
    let ws = repo_with_commit();
    let result = ws.run("GitPush", json!({}));
    assert_eq!(result.message, "Remote 'origin' does not exist. Configure it with GitRemote first.");
    assert_eq!(result.error.as_deref(), Some("Missing remote"));
}

#[test]
fn push_to_local_bare_remote() {
    let ws = repo_with_commit();
    let bare = tempfile::tempdir().expect("tempdir");
    git(bare.path(), &["init", "-q", "--bare"]);
    let url = bare.path().display().to_string();
    assert!(ws.run("GitRemote", json!({ "name": "origin", "url": url })).is_success());
    let result = ws.run("GitPush", json!({}));
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.message, "Pushed to origin/main");
    assert_eq!(git(bare.path(), &["rev-list", "--count", "main"]), "1");
}

#[test]
fn remote_add_twice_updates_url() {
    let ws = repo_with_commit();
    let created = ws.run("GitRemote", json!({ "url": "https://example.com/a.git" }));
    assert_eq!(created.message, "Git remote created: origin");
    let updated = ws.run("GitRemote", json!({ "operation": "add", "url": "https://example.com/b.git" }));
    assert_eq!(updated.message, "Git remote updated: origin");
    assert_eq!(git(ws.root(), &["remote", "get-url", "origin"]), "https://example.com/b.git");
    let list = ws.run("GitRemote", json!({ "operation": "list" }));
    assert_eq!(list.data.expect("data")["remotes"], json!(["origin"]));
}

#[test]
fn checkout_suggests_main_for_master() {
    let ws = repo_with_commit();
    let result = ws.run("GitCheckout", json!({ "branch": "master" }));
    assert!(result.is_failure());
    assert_eq!(
        result.error.as_deref(),
        Some("Branch 'master' does not exist. Did you mean 'main'? (Current branch: main)")
    );
    assert_eq!(result.data.expect("data")["suggestions"], json!(["main"]));
}

#[test]
fn branch_checkout_and_merge() {
    let ws = repo_with_commit();
    assert_eq!(ws.run("GitBranch", json!({ "name": "feature" })).message, "Branch created: feature");
    let listed = ws.run("GitBranch", json!({}));
    assert_eq!(listed.data.expect("data")["branches"], json!(["feature", "main"]));

    assert!(ws.run("GitCheckout", json!({ "branch": "feature" })).is_success());
    ws.write("feature.txt", "f\n");
    assert!(ws.run("GitAdd", json!({ "files": ["feature.txt"] })).is_success());
    assert!(ws.run("GitCommit", json!({ "message": "feature work" })).is_success());
    assert!(ws.run("GitCheckout", json!({ "branch": "main" })).is_success());
    let merged = ws.run("GitMerge", json!({ "branch": "feature" }));
    assert_eq!(merged.message, "Merged branch: feature");
    assert!(ws.path("feature.txt").exists());
}

#[test]
fn raw_status_previews_output() {
    let ws = repo_with_commit();
    ws.write("new.txt", "n\n");
    let result = ws.run("RunGitCommand", json!({ "command": "git status --short" }));
    assert!(result.is_success(), "{result:?}");
    assert!(result.message.starts_with("Git status:\n"));
    assert!(result.message.contains("new.txt"));
}

#[test]
fn raw_command_refuses_workdir_overrides() {
    let ws = repo_with_commit();
    let result = ws.run("RunGitCommand", json!({ "args": ["-C", "/", "status"] }));
    assert!(result.is_failure());
}

#[test]
fn raw_command_refuses_config_overrides() {
    let ws = repo_with_commit();
    let result = ws.run("RunGitCommand", json!({ "command": "git -c core.worktree=/tmp status" }));
    assert!(result.is_failure());
    assert_eq!(result.message, "Global git options (such as -c) are not allowed");
}

#[test]
fn raw_command_output_must_stay_in_the_sandbox() {
    let ws = repo_with_commit();
    let outside = ws.root().parent().expect("parent").join("escaped.tar");
    let args = json!({ "args": ["archive", "-o", outside.to_string_lossy(), "HEAD"] });
    let result = ws.run("RunGitCommand", args);
    assert!(result.is_failure());
    assert_eq!(result.message, "Security violation");
    assert!(!outside.exists());

    let relative = ws.run("RunGitCommand", json!({ "command": "archive --output=../escaped.tar HEAD" }));
    assert_eq!(relative.message, "Security violation");

    let inside = ws.run("RunGitCommand", json!({ "command": "archive -o snapshot.tar HEAD" }));
    assert!(inside.is_success(), "{inside:?}");
    assert!(ws.path("snapshot.tar").is_file());
}
