//! Git handlers.
//!
//! All commands run through [`Git`] with an argument vector in the repository
//! that governs the current view. Repeating `GitInit`, `GitCommit` or
//! `GitRemote add` is safe.

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info};

use crate::core::action::{ActionContext, ActionResult, Params};
use crate::io::git::{Git, GitOutput, find_git_root, stageable_entries};
use crate::io::transaction::Transaction;

use super::{ActionSupervisor, reject};

const PREVIEW_CHARS: usize = 200;

fn not_a_repo() -> anyhow::Error {
    reject("Not in a git repository. Run GitInit first.", "Missing .git")
}

fn require_repo(sup: &ActionSupervisor) -> Result<Git> {
    sup.repo().ok_or_else(not_a_repo)
}

/// Options that would point git at a directory other than the sandbox repo.
fn escapes_workdir(arg: &str) -> bool {
    arg == "-C" || arg.starts_with("--git-dir") || arg.starts_with("--work-tree")
}

const OUTPUT_FLAGS: &[&str] = &["-o", "--output", "--output-directory"];

/// Paths given to output flags, as `-o x`, `--output=x` or `-ox`. The leading subcommand is skipped.
fn output_paths(args: &[String]) -> Vec<&str> {
    let mut paths = Vec::new();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        if let Some((flag, value)) = arg.split_once('=') {
            if OUTPUT_FLAGS.contains(&flag) {
                paths.push(value);
            }
        } else if OUTPUT_FLAGS.contains(&arg.as_str()) {
            if let Some(value) = rest.next() {
                paths.push(value.as_str());
            }
        } else if let Some(value) = arg.strip_prefix("-o").filter(|v| !v.is_empty()) {
            paths.push(value);
        }
    }
    paths
}

fn outcome(out: GitOutput, ok: String, failed: String) -> ActionResult {
    let data = json!({ "stdout": out.stdout, "stderr": out.stderr, "exit_code": out.code });
    if out.success {
        ActionResult::success(ok).with_data(data)
    } else {
        let reason = out.stderr.trim();
        let reason = if reason.is_empty() { "Unknown error" } else { reason };
        ActionResult::failure(failed, reason).with_data(data)
    }
}

fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub(super) fn run_git_command(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let args: Vec<String> = match params.str(&["command"]) {
        Some(command) if !command.trim().is_empty() => {
            let command = command.trim();
            let command = command.strip_prefix("git ").unwrap_or(command);
            command.split_whitespace().map(str::to_string).collect()
        }
        _ => params.strings(&["args"]).unwrap_or_default(),
    };
    let Some(subcommand) = args.first().cloned() else {
        return Err(reject("No git command provided", "Missing command"));
    };
    if args.iter().any(|arg| escapes_workdir(arg)) {
        return Err(reject("Git options that change the working directory are not allowed", "Disallowed option"));
    }
    if subcommand.starts_with('-') {
        return Err(reject("Global git options (such as -c) are not allowed", "Disallowed option"));
    }

    let git = match sup.repo() {
        Some(git) => git,
        None if subcommand == "init" => sup.git_at(&sup.current_view()),
        None => return Err(reject("Not in a git repository. Run 'git init' first.", "Missing .git")),
    };
    for target in output_paths(&args) {
        sup.policy().validate_path(&git.workdir().join(target))?;
    }
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    let out = git.run_raw(&argv)?;
    let joined = args.join(" ");
    if out.success && (subcommand == "status" || subcommand == "log") {
        let shown = preview(&out.stdout);
        let message = if shown.is_empty() {
            format!("Git {subcommand} executed")
        } else {
            format!("Git {subcommand}:\n{shown}")
        };
        return Ok(outcome(out, message, String::new()));
    }
    let mut result = outcome(out, format!("Git command executed: {joined}"), format!("Git command failed: {joined}"));
    if let Some(error) = result.error.as_mut() {
        if error.to_lowercase().contains("not a git repository") {
            *error = "Not a git repository. Run 'git init' first.".to_string();
        }
    }
    Ok(result)
}

/// Initialise a repository in the current view. An existing repository is left alone.
pub(super) fn init(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let view = sup.current_view();
    if let Some(root) = find_git_root(sup.sandbox_root(), &view) {
        debug!(root = %root.display(), "repository already initialized");
        return Ok(ActionResult::success("Git repository already initialized")
            .with_data(json!({ "root": sup.display_path(&root), "created": false })));
    }
    let branch = params
        .str(&["branch", "initial_branch"])
        .unwrap_or_else(|| sup.config().git.default_branch.clone());
    sup.git_at(&view)
        .init(branch.trim())
        .map_err(|err| reject("Failed to initialize git repository", format!("{err:#}")))?;
    info!(root = %view.display(), "initialized repository");
    Ok(ActionResult::success("Git repository initialized")
        .with_data(json!({ "root": sup.display_path(&view), "branch": branch.trim(), "created": true })))
}

/// Stage files. `.` (the default) stages every top-level entry except
/// nested repositories and the staging directory.
pub(super) fn add(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let requested = params
        .strings(&["files", "paths", "path"])
        .filter(|files| !files.is_empty())
        .unwrap_or_else(|| vec![".".to_string()]);
    let files = if requested.iter().all(|f| f == "." || f == "./") {
        let staging = &sup.config().staging_dir_name;
        stageable_entries(git.workdir())?
            .into_iter()
            .filter(|name| name != staging)
            .collect()
    } else {
        requested
    };
    if files.is_empty() {
        return Ok(ActionResult::success("No files to add (all entries are embedded repos or .git).")
            .with_data(json!({ "files": files })));
    }
    git.add(&files)
        .map_err(|err| reject("Failed to add files to staging", format!("{err:#}")))?;
    Ok(ActionResult::success(format!("Files added to staging: {}", files.join(", ")))
        .with_data(json!({ "files": files })))
}

/// Commit staged changes; nothing staged is a successful no-op.
pub(super) fn commit(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let message = params
        .str(&["message", "msg"])
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Automated commit".to_string());
    let committed = git
        .commit_staged(&message)
        .map_err(|err| reject("Failed to commit changes", format!("{err:#}")))?;
    if !committed {
        return Ok(ActionResult::success("No changes to commit.").with_data(json!({ "committed": false })));
    }
    let sha = git.head_short_sha()?;
    Ok(ActionResult::success(format!("Changes committed: {message}"))
        .with_data(json!({ "committed": true, "commit": sha, "message": message })))
}

pub(super) fn push(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let remote = params.str(&["remote"]).unwrap_or_else(|| "origin".to_string());
    let branch = match params.str(&["branch"]) {
        Some(branch) => Some(branch),
        None => git.current_branch()?,
    };
    let set_upstream = params.bool(&["set_upstream"], true);
    if git.remote_url(&remote)?.is_none() {
        return Err(reject(
            format!("Remote '{remote}' does not exist. Configure it with GitRemote first."),
            "Missing remote",
        ));
    }

    let mut args = vec!["push"];
    if set_upstream && branch.is_some() {
        args.push("-u");
    }
    args.push(remote.as_str());
    if let Some(branch) = branch.as_deref() {
        args.push(branch);
    }
    let mut out = git.run_raw(&args)?;
    if let Some(branch) = branch.as_deref() {
        if !out.success && !set_upstream && out.stderr.to_lowercase().contains("no upstream branch") {
            info!(%remote, branch, "retrying push with upstream");
            out = git.run_raw(&["push", "-u", remote.as_str(), branch])?;
        }
    }
    let target = match branch.as_deref() {
        Some(branch) => format!("{remote}/{branch}"),
        None => remote.clone(),
    };
    Ok(outcome(out, format!("Pushed to {target}"), "Failed to push changes".to_string()))
}

pub(super) fn pull(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let remote = params.str(&["remote"]).unwrap_or_else(|| "origin".to_string());
    let branch = params.str(&["branch"]);
    let mut args = vec!["pull", remote.as_str()];
    if let Some(branch) = branch.as_deref() {
        args.push(branch);
    }
    let out = git.run_raw(&args)?;
    Ok(outcome(out, format!("Pulled from {remote}"), "Failed to pull changes".to_string()))
}

/// Create a branch when `name` is given, otherwise list local branches.
pub(super) fn branch(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    if let Some(name) = params.str(&["name", "branch"]).filter(|n| !n.trim().is_empty()) {
        let name = name.trim();
        let out = git.run_raw(&["branch", name])?;
        return Ok(outcome(out, format!("Branch created: {name}"), format!("Failed to create branch: {name}")));
    }
    let branches = git.local_branches()?;
    let current = git.current_branch()?;
    Ok(ActionResult::success("Branches listed").with_data(json!({ "branches": branches, "current": current })))
}

/// Remote-tracking branch names with the remote prefix removed.
fn remote_branch_names(git: &Git) -> Result<Vec<String>> {
    let out = git.run_raw(&["branch", "-r"])?;
    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("->"))
        .filter_map(|line| line.split_once('/').map(|(_, name)| name.to_string()))
        .collect())
}

fn suggestion(branch: &str, known: &[String]) -> Option<&'static str> {
    match branch {
        "main" if known.iter().any(|b| b == "master") => Some("master"),
        "master" if known.iter().any(|b| b == "main") => Some("main"),
        _ => None,
    }
}

pub(super) fn checkout(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let branch = params.require_str(&["branch", "name"])?;
    let create_new = params.bool(&["create_new", "create"], false);

    if create_new {
        git.checkout_new_branch(&branch)
            .map_err(|err| reject(format!("Failed to checkout branch: {branch}"), format!("{err:#}")))?;
        return Ok(ActionResult::success(format!("Checked out branch: {branch}"))
            .with_data(json!({ "branch": branch, "created": true })));
    }

    let local = git.local_branches()?;
    let mut known = local.clone();
    known.extend(remote_branch_names(&git)?);
    if !known.contains(&branch) {
        let suggestions: Vec<&str> = suggestion(&branch, &known).into_iter().collect();
        let mut error = format!("Branch '{branch}' does not exist.");
        match suggestions.first() {
            Some(alt) => {
                let current = git.current_branch()?.unwrap_or_else(|| "unknown".to_string());
                error.push_str(&format!(" Did you mean '{alt}'? (Current branch: {current})"));
            }
            None => {
                let mut sorted = local.clone();
                sorted.sort();
                let mut available = sorted.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
                if sorted.len() > 5 {
                    available.push_str(&format!(" (and {} more)", sorted.len() - 5));
                }
                error.push_str(&format!(
                    " Available branches: {available}. Use GitCheckout with create_new to create it."
                ));
            }
        }
        return Ok(ActionResult::failure(format!("Failed to checkout branch: {branch}"), error)
            .with_data(json!({ "available_branches": local, "suggestions": suggestions })));
    }

    git.checkout_branch(&branch)
        .map_err(|err| reject(format!("Failed to checkout branch: {branch}"), format!("{err:#}")))?;
    Ok(ActionResult::success(format!("Checked out branch: {branch}"))
        .with_data(json!({ "branch": branch, "created": false })))
}

pub(super) fn merge(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let branch = params.require_str(&["branch", "name"])?;
    let out = git.run_raw(&["merge", branch.as_str()])?;
    Ok(outcome(out, format!("Merged branch: {branch}"), format!("Failed to merge branch: {branch}")))
}

/// Point remote `name` at `url`, adding it or updating the existing one.
/// Returns `"created"` or `"updated"`.
pub(super) fn configure_remote(git: &Git, name: &str, url: &str) -> Result<&'static str> {
    let (args, action) = if git.remote_url(name)?.is_some() {
        (["remote", "set-url", name, url], "updated")
    } else {
        (["remote", "add", name, url], "created")
    };
    let out = git.run_raw(&args)?;
    if !out.success {
        return Err(reject("Failed to configure git remote", out.stderr.trim()));
    }
    Ok(action)
}

/// `operation`: add (default), set-url, remove|rm, rename, list, show.
pub(super) fn remote(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let git = require_repo(sup)?;
    let operation = params
        .str(&["operation", "op"])
        .map(|op| op.trim().to_lowercase())
        .unwrap_or_else(|| "add".to_string());
    let name = params.str(&["name"]).unwrap_or_else(|| "origin".to_string());

    match operation.as_str() {
        "list" => {
            let out = git.run_raw(&["remote", "-v"])?;
            let remotes = git.remotes()?;
            let mut result = outcome(out, "Git remotes listed".to_string(), "Failed to list git remotes".to_string());
            if let Some(data) = result.data.as_mut() {
                data["remotes"] = json!(remotes);
            }
            Ok(result)
        }
        "remove" | "rm" => {
            let out = git.run_raw(&["remote", "remove", name.as_str()])?;
            Ok(outcome(out, format!("Git remote removed: {name}"), format!("Failed to remove git remote: {name}")))
        }
        "rename" => {
            let old_name = params.str(&["old_name"]).unwrap_or_else(|| name.clone());
            let new_name = params
                .str(&["new_name"])
                .ok_or_else(|| reject("New remote name is required for rename", "Missing new_name"))?;
            let out = git.run_raw(&["remote", "rename", old_name.as_str(), new_name.as_str()])?;
            Ok(outcome(
                out,
                format!("Git remote renamed: {old_name} -> {new_name}"),
                format!("Failed to rename git remote: {old_name}"),
            ))
        }
        "show" => {
            let out = git.run_raw(&["remote", "show", "-n", name.as_str()])?;
            Ok(outcome(out, format!("Git remote details for: {name}"), format!("Failed to show git remote: {name}")))
        }
        "set-url" => {
            let url = params
                .require_str(&["url"])
                .map_err(|_| reject("Remote URL is required for set-url", "Missing url"))?;
            let out = git.run_raw(&["remote", "set-url", name.as_str(), url.as_str()])?;
            Ok(outcome(out, format!("Git remote URL updated: {name}"), format!("Failed to update git remote URL: {name}")))
        }
        "add" => {
            let url = params
                .require_str(&["url"])
                .map_err(|_| reject("Remote URL is required", "Missing url"))?;
            let action = configure_remote(&git, &name, &url)?;
            Ok(ActionResult::success(format!("Git remote {action}: {name}"))
                .with_data(json!({ "remote": name, "url": url, "action": action })))
        }
        other => Err(reject(format!("Unknown remote operation: {other}"), "Invalid operation")),
    }
}
