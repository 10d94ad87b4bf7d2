//! Git adapter for repository actions.
//!
//! A small, explicit wrapper around `git` subprocess calls: arguments are
//! passed as a vector with an explicit working directory and never go through
//! a shell.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Result of a git invocation that is reported back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for GitOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    binary: String,
    workdir: PathBuf,
}

impl Git {
    pub fn new(binary: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Initialise a repository with `branch` as the initial branch.
    #[instrument(skip_all, fields(branch))]
    pub fn init(&self, branch: &str) -> Result<()> {
        let with_branch = self.run(&["init", "-b", branch])?;
        if with_branch.status.success() {
            return Ok(());
        }
        // Older git without `-b`: init, then point HEAD at the branch.
        debug!("git init -b unsupported, falling back");
        self.run_checked(&["init"])?;
        self.run_checked(&["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")])?;
        Ok(())
    }

    /// Current branch name, or `None` on a detached HEAD.
    ///
    /// On an unborn branch (no commits) this reads the symbolic ref instead.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if out.status.success() {
            let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if name == "HEAD" {
                warn!("detached HEAD detected");
                return Ok(None);
            }
            return Ok(Some(name));
        }
        let out = self.run(&["symbolic-ref", "--short", "HEAD"])?;
        if out.status.success() {
            let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
            return Ok((!name.is_empty()).then_some(name));
        }
        Ok(None)
    }

    /// True once HEAD resolves to a commit.
    pub fn has_commits(&self) -> Result<bool> {
        Ok(self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?.status.success())
    }

    /// URL of a remote, or `None` if it is not configured.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>> {
        let out = self.run(&["remote", "get-url", name])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    pub fn remotes(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["remote"])?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    pub fn local_branches(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Stage the given pathspecs.
    pub fn add(&self, paths: &[String]) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    /// On an unborn branch everything in the index counts as staged.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        let staged = if self.has_commits()? {
            self.has_staged_changes()?
        } else {
            !self.run_capture(&["ls-files", "--cached"])?.trim().is_empty()
        };
        if !staged {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Short SHA of HEAD.
    pub fn head_short_sha(&self) -> Result<String> {
        Ok(self.run_capture(&["rev-parse", "--short", "HEAD"])?.trim().to_string())
    }

    /// Run arbitrary arguments and return the raw outcome (non-zero exit is not an error).
    #[instrument(skip_all, fields(args = %args.join(" ")))]
    pub fn run_raw(&self, args: &[&str]) -> Result<GitOutput> {
        Ok(self.run(args)?.into())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.binary)
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn {} {}", self.binary, args.join(" ")))
    }
}

/// Snapshot of the repository as seen from the sandbox. Recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitRepoState {
    pub root: Option<PathBuf>,
    pub has_commits: bool,
    pub has_origin: bool,
    pub current_branch: Option<String>,
}

impl GitRepoState {
    pub fn is_repo(&self) -> bool {
        self.root.is_some()
    }

    /// Probe the repository that governs `view` inside `sandbox_root`.
    ///
    /// `<sandbox_root>/.git` wins; otherwise the nearest ancestor of `view`
    /// (up to the sandbox root) that contains `.git`.
    pub fn probe(binary: &str, sandbox_root: &Path, view: &Path) -> Result<Self> {
        let Some(root) = find_git_root(sandbox_root, view) else {
            return Ok(Self {
                root: None,
                has_commits: false,
                has_origin: false,
                current_branch: None,
            });
        };
        let git = Git::new(binary, &root);
        Ok(Self {
            has_commits: git.has_commits()?,
            has_origin: git.remote_url("origin")?.is_some(),
            current_branch: git.current_branch()?,
            root: Some(root),
        })
    }
}

pub fn find_git_root(sandbox_root: &Path, view: &Path) -> Option<PathBuf> {
    if sandbox_root.join(".git").exists() {
        return Some(sandbox_root.to_path_buf());
    }
    view.ancestors()
        .take_while(|dir| dir.starts_with(sandbox_root))
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Top-level entries of `dir` that `git add .` may stage: everything except
/// `.git` itself and nested repositories.
pub fn stageable_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == ".git" {
            continue;
        }
        let path = entry.path();
        if path.is_dir() && path.join(".git").exists() {
            warn!(path = %path.display(), "skipping embedded repository");
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}
