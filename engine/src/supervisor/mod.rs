//! Action dispatch for one sandbox root.
//!
//! [`ActionSupervisor::dispatch`] is the only mutation entry point. Every
//! dispatch parses the action tag, short-circuits dry runs, opens a
//! [`Transaction`], runs the handler and then commits or rolls back. Handler
//! errors never cross this boundary: they come back as failed
//! [`ActionResult`]s.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::core::action::{Action, ActionContext, ActionKind, ActionResult, ParamError, Params};
use crate::core::edit::EditError;
use crate::core::sanitize::strip_ansi;
use crate::io::config::{ENGINE_DIR, EngineConfig, config_path, load_config};
use crate::io::git::{Git, GitRepoState, find_git_root};
use crate::io::remote::RemoteRepoClient;
use crate::io::security::{PolicyViolation, SecurityPolicy};
use crate::io::transaction::Transaction;

mod compose;
mod files;
mod git;
mod github;
mod resolve;
mod search;
mod shell;
mod text;

type Handler = fn(&ActionSupervisor, Params<'_>, &ActionContext, &mut Transaction) -> Result<ActionResult>;

/// A handler-level refusal with a caller-facing message and a short reason.
#[derive(Debug, Error)]
#[error("{message} ({reason})")]
pub(crate) struct Rejection {
    message: String,
    reason: String,
}

pub(crate) fn reject(message: impl Into<String>, reason: impl Into<String>) -> anyhow::Error {
    Rejection {
        message: message.into(),
        reason: reason.into(),
    }
    .into()
}

/// Executes actions inside one sandbox root.
pub struct ActionSupervisor {
    config: EngineConfig,
    policy: SecurityPolicy,
    view: Mutex<PathBuf>,
    remote: Option<Box<dyn RemoteRepoClient>>,
}

impl std::fmt::Debug for ActionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSupervisor")
            .field("root", &self.policy.root())
            .field("view", &self.current_view())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl ActionSupervisor {
    /// Build a supervisor for `root`. Fails if the root is not an accessible
    /// directory or the config is invalid.
    pub fn new(root: &Path, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let policy = SecurityPolicy::new(root, &config.policy)?
            .with_reserved_dirs([config.staging_dir_name.clone(), ENGINE_DIR.to_string()]);
        let view = policy.root().to_path_buf();
        debug!(root = %view.display(), "supervisor ready");
        Ok(Self {
            config,
            policy,
            view: Mutex::new(view),
            remote: None,
        })
    }

    /// Build a supervisor using `<root>/.engine/config.toml` (defaults when absent).
    pub fn from_root(root: &Path) -> Result<Self> {
        let config = load_config(&config_path(root))
            .with_context(|| format!("load config for {}", root.display()))?;
        Self::new(root, config)
    }

    pub fn with_remote_client(mut self, client: Box<dyn RemoteRepoClient>) -> Self {
        self.remote = Some(client);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Canonical sandbox root.
    pub fn sandbox_root(&self) -> &Path {
        self.policy.root()
    }

    /// Directory relative paths are resolved against (starts at the root).
    pub fn current_view(&self) -> PathBuf {
        self.view.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Move the current view. Relative targets prefer an existing directory
    /// under the view, then under the root. Targets outside the sandbox are refused.
    pub fn change_directory(&self, target: &str) -> Result<PathBuf> {
        let view = self.current_view();
        let candidate = resolve::directory_candidate(self.sandbox_root(), &view, target.trim());
        let resolved = self.policy.validate_path(&candidate)?;
        if !resolved.is_dir() {
            anyhow::bail!("not a directory: {}", target.trim());
        }
        info!(view = %resolved.display(), "changed current view");
        *self.view.lock().unwrap_or_else(PoisonError::into_inner) = resolved.clone();
        Ok(resolved)
    }

    /// Move a view that sat inside the removed `dir` up to its nearest surviving ancestor.
    pub(crate) fn retreat_view_from(&self, dir: &Path) {
        let mut view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        if !view.starts_with(dir) {
            return;
        }
        let root = self.policy.root();
        let fallback = view
            .ancestors()
            .take_while(|candidate| candidate.starts_with(root))
            .find(|candidate| candidate.is_dir())
            .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
        info!(from = %view.display(), to = %fallback.display(), "current view removed, moved up");
        *view = fallback;
    }

    /// Snapshot of the repository governing the current view.
    pub fn git_repo_state(&self) -> Result<GitRepoState> {
        GitRepoState::probe(&self.config.git.binary, self.sandbox_root(), &self.current_view())
    }

    /// Run one action under its own transaction.
    #[instrument(skip_all, fields(action = %action.kind))]
    pub fn dispatch(&self, action: &Action, ctx: &ActionContext) -> ActionResult {
        let kind = match action.kind.trim().parse::<ActionKind>() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(action = %action.kind, "unknown action type");
                return ActionResult::failure(format!("Unknown action type: {}", action.kind), err.to_string());
            }
        };
        if ctx.dry_run {
            return ActionResult::dry_run(format!("Dry run: {kind} was not executed"))
                .with_data(json!({ "action": kind.as_str(), "params": action.params }));
        }
        let mut tx = self.begin_transaction();
        let result = self.execute(kind, action.params(), ctx, &mut tx);
        finish(tx, result)
    }

    /// Run several actions. `atomic` shares one transaction and stops at the
    /// first failure; otherwise each action commits on its own.
    #[instrument(skip_all, fields(count = actions.len(), atomic))]
    pub fn dispatch_batch(&self, actions: &[Action], atomic: bool, ctx: &ActionContext) -> ActionResult {
        if ctx.dry_run {
            let kinds: Vec<&str> = actions.iter().map(|a| a.kind.as_str()).collect();
            return ActionResult::dry_run(format!("Dry run: {} action(s) were not executed", actions.len()))
                .with_data(json!({ "atomic": atomic, "actions": kinds }));
        }
        if !atomic {
            return compose::run_batch(self, actions, ctx);
        }
        let mut tx = self.begin_transaction();
        let result = compose::run_atomic(self, actions, ctx, &mut tx);
        finish(tx, result)
    }

    fn begin_transaction(&self) -> Transaction {
        Transaction::begin(self.sandbox_root(), &self.config.staging_dir_name)
    }

    /// Run a parsed action inside `tx` without committing.
    pub(crate) fn execute(
        &self,
        kind: ActionKind,
        params: Params<'_>,
        ctx: &ActionContext,
        tx: &mut Transaction,
    ) -> ActionResult {
        debug!(%kind, "running handler");
        match handler_for(kind)(self, params, ctx, tx) {
            Ok(result) => result,
            Err(err) => failure_from_error(kind, &err),
        }
    }

    /// Resolve and admit a caller-supplied path for `kind`.
    pub(crate) fn target(&self, kind: ActionKind, raw: &str) -> Result<PathBuf, PolicyViolation> {
        let view = self.current_view();
        let candidate = resolve::candidate(self.sandbox_root(), &view, raw.trim(), kind);
        let resolved = self.policy.validate_path(&candidate)?;
        match resolve::collapse_doubled_segment(self.sandbox_root(), &view, &resolved) {
            Some(fixed) => {
                debug!(from = %resolved.display(), to = %fixed.display(), "collapsed doubled path segment");
                self.policy.validate_path(&fixed)
            }
            None => Ok(resolved),
        }
    }

    /// Path as shown to callers: relative to the root when inside it.
    pub(crate) fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.sandbox_root())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| path.display().to_string())
    }

    pub(crate) fn git_at(&self, workdir: &Path) -> Git {
        Git::new(&self.config.git.binary, workdir)
    }

    /// Git handle for the repository governing the current view, if any.
    pub(crate) fn repo(&self) -> Option<Git> {
        find_git_root(self.sandbox_root(), &self.current_view()).map(|root| self.git_at(&root))
    }

    pub(crate) fn remote(&self) -> Option<&dyn RemoteRepoClient> {
        self.remote.as_deref()
    }
}

/// Commit unless the result failed; release errors are logged.
fn finish(mut tx: Transaction, result: ActionResult) -> ActionResult {
    if result.is_failure() {
        match tx.rollback() {
            Ok(report) if !report.is_clean() => {
                error!(failures = ?report.failures, "rollback finished with failures");
            }
            Ok(report) => debug!(restored = report.restored.len(), removed = report.removed.len(), "rolled back"),
            Err(err) => error!(err = %err, "rollback refused"),
        }
    } else if let Err(err) = tx.commit() {
        error!(err = %err, "commit refused");
    }
    result
}

fn failure_from_error(kind: ActionKind, err: &anyhow::Error) -> ActionResult {
    if let Some(rejection) = err.downcast_ref::<Rejection>() {
        return ActionResult::failure(&rejection.message, &rejection.reason);
    }
    if let Some(violation) = err.downcast_ref::<PolicyViolation>() {
        warn!(%kind, reason = %violation, "policy violation");
        return ActionResult::failure("Security violation", violation.to_string());
    }
    if let Some(param) = err.downcast_ref::<ParamError>() {
        return ActionResult::failure(format!("{kind}: invalid parameters"), param.to_string());
    }
    if let Some(edit) = err.downcast_ref::<EditError>() {
        return ActionResult::failure(format!("{kind} failed"), edit.to_string());
    }
    error!(%kind, err = %format!("{err:#}"), "handler error");
    ActionResult::failure(format!("Action failed: {kind}"), format!("{err:#}"))
}

/// Caller-supplied content with terminal escape sequences removed.
pub(crate) fn content_param(params: Params<'_>, keys: &[&str]) -> String {
    strip_ansi(&params.text(keys))
}

fn handler_for(kind: ActionKind) -> Handler {
    use ActionKind as K;
    match kind {
        K::CreateFile => files::create_file,
        K::EditFile | K::RewriteEntireFile => files::rewrite_file,
        K::ReadFile => files::read_file,
        K::DeleteFile => files::delete_file,
        K::MoveFile => files::move_file,
        K::CopyFile => files::copy_file,
        K::RenameFile => files::rename_file,
        K::CreateFolder => files::create_folder,
        K::DeleteFolder => files::delete_folder,
        K::MoveFolder => files::move_folder,
        K::CopyFolder => files::copy_folder,
        K::AppendText | K::InsertAtBottom => text::insert_at_bottom,
        K::PrependText | K::InsertAtTop => text::insert_at_top,
        K::ReplaceText => text::replace_text,
        K::InsertBeforeLine => text::insert_before_line,
        K::InsertAfterLine => text::insert_after_line,
        K::DeleteLineRange => text::delete_line_range,
        K::ApplyPatch => text::apply_patch,
        K::ReplaceByPattern => text::replace_by_pattern,
        K::DeleteByPattern => text::delete_by_pattern,
        K::ReplaceByFuzzyMatch => text::replace_by_fuzzy_match,
        K::InsertBlockAtLine => text::insert_block_at_line,
        K::ReplaceBlock => text::replace_block,
        K::RemoveBlock => text::remove_block,
        K::UpdateJsonKey => text::update_json_key,
        K::UpdateYamlKey => text::update_yaml_key,
        K::InsertIntoFunction => text::insert_into_function,
        K::InsertIntoClass => text::insert_into_class,
        K::AddDecorator => text::add_decorator,
        K::AddImport => text::add_import,
        K::RunGitCommand => git::run_git_command,
        K::GitInit => git::init,
        K::GitAdd => git::add,
        K::GitCommit => git::commit,
        K::GitPush => git::push,
        K::GitPull => git::pull,
        K::GitBranch => git::branch,
        K::GitCheckout => git::checkout,
        K::GitMerge => git::merge,
        K::GitRemote => git::remote,
        K::SearchFiles => search::search_files,
        K::FindReplace => search::find_replace,
        K::GenerateProjectStructure => search::generate_project_structure,
        K::ScaffoldModule => search::scaffold_module,
        K::RunShellCommand => shell::run_shell_command,
        K::RunTests => shell::run_tests,
        K::BuildProject => shell::build_project,
        K::BatchOperation => compose::batch_operation,
        K::AtomicOperation => compose::atomic_operation,
        K::GitHubCreateRepo => github::create_repo,
        K::GitHubDeleteRepo => github::delete_repo,
        K::GitHubPushPath => github::push_path,
        K::GitHubCreateIssue => github::create_issue,
        K::GitHubCreatePr => github::create_pull_request,
    }
}
