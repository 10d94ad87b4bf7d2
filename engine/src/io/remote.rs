//! Remote repository hosting collaborator.
//!
//! The engine never speaks HTTP itself; callers plug in a [`RemoteRepoClient`]
//! (a GitHub REST client in production, a recording fake in tests).

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSpec {
    pub name: String,
    pub description: Option<String>,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRepo {
    /// `owner/name`.
    pub full_name: String,
    pub clone_url: Option<String>,
    pub html_url: Option<String>,
}

/// Upload of a local subtree as one commit on `branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushRequest {
    pub repo: String,
    pub local_root: PathBuf,
    /// Files to upload, relative to `local_root`, `/`-separated.
    pub files: Vec<String>,
    pub branch: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    /// `(path, reason)` pairs.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRequest {
    pub repo: String,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRequest {
    pub repo: String,
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: Option<String>,
    pub draft: bool,
}

/// Issue or pull request as created remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedItem {
    pub number: u64,
    pub url: Option<String>,
}

/// Remote hosting operations used by the `GitHub*` actions.
pub trait RemoteRepoClient: Send + Sync {
    fn create_repository(&self, spec: &RepoSpec) -> Result<CreatedRepo>;
    fn delete_repository(&self, repo: &str) -> Result<()>;
    fn push_path(&self, request: &PushRequest) -> Result<PushReport>;
    fn create_issue(&self, request: &IssueRequest) -> Result<CreatedItem>;
    fn create_pull_request(&self, request: &PullRequestRequest) -> Result<CreatedItem>;
}
