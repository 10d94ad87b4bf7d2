//! Remote hosting handlers, backed by the supervisor's [`RemoteRepoClient`].

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use crate::core::action::{ActionContext, ActionKind, ActionResult, Params};
use crate::io::remote::{IssueRequest, PullRequestRequest, PushRequest, RemoteRepoClient, RepoSpec};
use crate::io::transaction::Transaction;

use super::git::configure_remote;
use super::search::admitted_files;
use super::{ActionSupervisor, reject};

fn client(sup: &ActionSupervisor) -> Result<&dyn RemoteRepoClient> {
    sup.remote()
        .ok_or_else(|| reject("No remote repository client configured", "Missing client"))
}

fn api_error(err: anyhow::Error) -> anyhow::Error {
    reject(format!("GitHub API error: {err:#}"), "Remote request failed")
}

pub(super) fn create_repo(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let client = client(sup)?;
    let name = params.require_str(&["name", "repo_name"])?;
    let private = match params.str(&["visibility"]) {
        Some(visibility) => visibility.trim().eq_ignore_ascii_case("private"),
        None => params.bool(&["private"], true),
    };
    let spec = RepoSpec {
        name: name.trim().to_string(),
        description: params.str(&["description"]),
        private,
    };
    let repo = client.create_repository(&spec).map_err(api_error)?;
    info!(repo = %repo.full_name, private, "created remote repository");

    let mut data = json!({ "repo": repo });
    if params.bool(&["sync_local"], true) {
        if let (Some(git), Some(url)) = (sup.repo(), repo.clone_url.as_deref()) {
            match configure_remote(&git, "origin", url) {
                Ok(action) => data["origin"] = json!(action),
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "could not point origin at new repository");
                    data["origin_error"] = json!(format!("{err:#}"));
                }
            }
        }
    }
    Ok(ActionResult::success(format!("GitHub repository created: {}", repo.full_name)).with_data(data))
}

pub(super) fn delete_repo(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let client = client(sup)?;
    let repo = params
        .str(&["repo", "full_name", "name"])
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| reject("Repository name ('owner/repo') is required", "Missing repo"))?;
    client.delete_repository(repo.trim()).map_err(api_error)?;
    info!(repo = %repo, "deleted remote repository");
    Ok(ActionResult::success(format!("GitHub repository deleted: {repo}"))
        .with_data(json!({ "repo": repo, "deleted": true })))
}

/// Upload a file or directory tree to `repo@branch`.
pub(super) fn push_path(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let client = client(sup)?;
    let repo = params.require_str(&["repo"])?;
    let raw = params.require_str(&["path", "local_path"])?;
    let path = sup.target(ActionKind::GitHubPushPath, &raw)?;
    if !path.exists() {
        return Err(reject(format!("Local path not found: {raw}"), "Path not found"));
    }

    let (local_root, files) = if path.is_dir() {
        let files: Vec<String> = admitted_files(sup, &path)
            .iter()
            .filter_map(|file| relative_slash_path(&path, file))
            .collect();
        (path.clone(), files)
    } else {
        let parent = path.parent().unwrap_or(sup.sandbox_root()).to_path_buf();
        let name: Vec<String> = relative_slash_path(&parent, &path).into_iter().collect();
        (parent, name)
    };
    let request = PushRequest {
        repo: repo.clone(),
        local_root,
        files,
        branch: params.str(&["branch"]).unwrap_or_else(|| "main".to_string()),
        message: params
            .str(&["message", "commit_message"])
            .unwrap_or_else(|| "Sync from engine".to_string()),
    };
    let report = client.push_path(&request).map_err(api_error)?;

    let shown = sup.display_path(&path);
    let message = format!("Pushed {shown} to {repo}@{}", request.branch);
    let failed: Vec<_> = report
        .failed
        .iter()
        .map(|(file, error)| json!({ "path": file, "error": error }))
        .collect();
    let data = json!({
        "repo": repo,
        "branch": request.branch,
        "uploaded": report.uploaded,
        "skipped": report.skipped,
        "failed": failed,
    });
    let result = if report.failed.is_empty() {
        ActionResult::success(message)
    } else if report.uploaded.is_empty() && report.skipped.is_empty() {
        ActionResult::failure(message, format!("{} file(s) failed to upload", report.failed.len()))
    } else {
        ActionResult::partial(message)
    };
    Ok(result.with_data(data))
}

fn relative_slash_path(base: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

pub(super) fn create_issue(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let client = client(sup)?;
    let (Some(repo), Some(title)) = (params.str(&["repo"]), params.str(&["title"])) else {
        return Err(reject("repo and title are required", "Missing parameters"));
    };
    let request = IssueRequest {
        repo,
        title,
        body: params.str(&["body", "description"]),
    };
    let issue = client.create_issue(&request).map_err(api_error)?;
    Ok(ActionResult::success(format!("Issue created in {}#{}", request.repo, issue.number))
        .with_data(json!({ "issue": issue })))
}

pub(super) fn create_pull_request(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let client = client(sup)?;
    let (Some(repo), Some(title), Some(head)) = (params.str(&["repo"]), params.str(&["title"]), params.str(&["head"]))
    else {
        return Err(reject("repo, title, and head are required", "Missing parameters"));
    };
    let request = PullRequestRequest {
        repo,
        title,
        head,
        base: params.str(&["base"]).unwrap_or_else(|| "main".to_string()),
        body: params.str(&["body", "description"]),
        draft: params.bool(&["draft"], false),
    };
    let pr = client.create_pull_request(&request).map_err(api_error)?;
    Ok(ActionResult::success(format!("Pull request created in {}#{}", request.repo, pr.number))
        .with_data(json!({ "pull_request": pr })))
}
