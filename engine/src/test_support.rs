//! Test-only helpers: throwaway sandboxes and a recording remote client.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde_json::Value;
use tempfile::TempDir;

use crate::core::action::{Action, ActionContext, ActionResult};
use crate::io::config::EngineConfig;
use crate::io::remote::{
    CreatedItem, CreatedRepo, IssueRequest, PullRequestRequest, PushReport, PushRequest, RemoteRepoClient, RepoSpec,
};
use crate::supervisor::ActionSupervisor;

/// A temporary sandbox root with a supervisor bound to it.
pub struct TestWorkspace {
    _dir: TempDir,
    pub supervisor: ActionSupervisor,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = ActionSupervisor::new(dir.path(), config).expect("supervisor");
        Self { _dir: dir, supervisor }
    }

    /// Canonical sandbox root.
    pub fn root(&self) -> &Path {
        self.supervisor.sandbox_root()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, content).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read file")
    }

    /// Dispatch one action with a default context.
    pub fn run(&self, kind: &str, params: Value) -> ActionResult {
        self.supervisor.dispatch(&Action::new(kind, params), &ActionContext::default())
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// `git init -b main` in `dir` with a local identity so commits work anywhere.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.email", "engine@example.com"]);
    git(dir, &["config", "user.name", "Engine Tests"]);
}

/// Run git in `dir` and return trimmed stdout; panics on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<String>,
    pushed: Vec<String>,
    failing: Vec<String>,
    next_number: u64,
}

/// Records every call; clones share state so a test can keep a handle after
/// boxing one into a supervisor.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    /// Uploads of these relative paths are reported as failed.
    pub fn failing_uploads<'a>(self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.lock().failing.extend(paths.into_iter().map(str::to_string));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Every file offered for upload, sorted.
    pub fn pushed_files(&self) -> Vec<String> {
        let mut files = self.lock().pushed.clone();
        files.sort();
        files
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_item(&self, call: String) -> CreatedItem {
        let mut state = self.lock();
        state.calls.push(call);
        state.next_number += 1;
        CreatedItem {
            number: state.next_number,
            url: None,
        }
    }
}

impl RemoteRepoClient for FakeRemote {
    fn create_repository(&self, spec: &RepoSpec) -> Result<CreatedRepo> {
        self.lock()
            .calls
            .push(format!("create_repository {} private={}", spec.name, spec.private));
        Ok(CreatedRepo {
            full_name: format!("fake/{}", spec.name),
            clone_url: None,
            html_url: None,
        })
    }

    fn delete_repository(&self, repo: &str) -> Result<()> {
        self.lock().calls.push(format!("delete_repository {repo}"));
        Ok(())
    }

    fn push_path(&self, request: &PushRequest) -> Result<PushReport> {
        let mut state = self.lock();
        state.calls.push(format!("push_path {}@{}", request.repo, request.branch));
        let mut report = PushReport::default();
        for file in &request.files {
            state.pushed.push(file.clone());
            if state.failing.contains(file) {
                report.failed.push((file.clone(), "rejected".to_string()));
            } else {
                report.uploaded.push(file.clone());
            }
        }
        Ok(report)
    }

    fn create_issue(&self, request: &IssueRequest) -> Result<CreatedItem> {
        Ok(self.next_item(format!("create_issue {} {}", request.repo, request.title)))
    }

    fn create_pull_request(&self, request: &PullRequestRequest) -> Result<CreatedItem> {
        Ok(self.next_item(format!(
            "create_pull_request {} {}->{}",
            request.repo, request.head, request.base
        )))
    }
}
