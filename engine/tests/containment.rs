use std::fs;
use std::path::Path;

use engine::io::security::PolicyViolation;
use engine::test_support::TestWorkspace;
use serde_json::json;

#[test]
fn parent_escape_is_rejected() {
    let ws = TestWorkspace::new();
    let err = ws
        .supervisor
        .policy()
        .validate_path(Path::new("../outside"))
        .expect_err("outside");
    assert!(matches!(err, PolicyViolation::OutsideSandbox { .. }));
    assert!(err.to_string().contains("outside sandbox"));
}

#[test]
fn dotdot_inside_root_normalizes() {
    let ws = TestWorkspace::new();
    fs::create_dir_all(ws.path("sub")).expect("mkdir");
    let resolved = ws
        .supervisor
        .policy()
        .validate_path(Path::new("sub/../sub/file"))
        .expect("inside");
    assert_eq!(resolved, ws.path("sub/file"));
}

#[test]
fn absolute_path_outside_root_is_rejected() {
    let ws = TestWorkspace::new();
    let outside = tempfile::tempdir().expect("tempdir");
    let result = ws.run("CreateFile", json!({ "path": outside.path().join("x.txt"), "content": "x" }));
    assert_eq!(result.message, "Security violation");
    assert!(!outside.path().join("x.txt").exists());
}

#[cfg(unix)]
#[test]
fn symlink_escape_is_rejected() {
    let ws = TestWorkspace::new();
    let outside = tempfile::tempdir().expect("tempdir");
    fs::write(outside.path().join("secret.txt"), "secret").expect("write");
    std::os::unix::fs::symlink(outside.path(), ws.path("link")).expect("symlink");
    let read = ws.run("ReadFile", json!({ "path": "link/secret.txt" }));
    assert_eq!(read.message, "Security violation");
    assert!(read.error.expect("error").contains("Symlink escape"));
    let write = ws.run("CreateFile", json!({ "path": "link/new.txt", "content": "x" }));
    assert_eq!(write.message, "Security violation");
    assert!(!outside.path().join("new.txt").exists());
}

#[test]
fn forbidden_extension_and_reserved_dirs_are_rejected() {
    let ws = TestWorkspace::new();
    let exe = ws.run("CreateFile", json!({ "path": "tool.exe", "content": "x" }));
    assert!(exe.error.expect("error").contains("Forbidden extension"));
    let staging = ws.run("CreateFile", json!({ "path": ".engine_backup/x.txt", "content": "x" }));
    assert!(staging.error.expect("error").contains("Disallowed directory"));
    let modules = ws.run("CreateFile", json!({ "path": "node_modules/x.js", "content": "x" }));
    assert_eq!(modules.message, "Security violation");
}

#[test]
fn oversized_file_is_rejected_before_reading() {
    let mut config = engine::io::config::EngineConfig::default();
    config.policy.max_file_size_mb = 1;
    let ws = TestWorkspace::with_config(config);
    ws.write("big.txt", &"x".repeat(1024 * 1024 + 1));
    let result = ws.run("ReadFile", json!({ "path": "big.txt" }));
    assert!(result.error.expect("error").contains("File too large"));
}

#[test]
fn doubled_view_segment_is_collapsed() {
    let ws = TestWorkspace::new();
    ws.write("demo/readme.md", "hi\n");
    ws.supervisor.change_directory("demo").expect("cd demo");
    let result = ws.run("CreateFile", json!({ "path": "demo/app.py", "content": "x = 1\n" }));
    assert!(result.is_success(), "{result:?}");
    assert_eq!(ws.read("demo/app.py"), "x = 1\n");
    assert!(!ws.path("demo/demo").exists());
}
