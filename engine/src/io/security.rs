//! Sandbox containment and file-type policy.
//!
//! Every path an action touches goes through [`SecurityPolicy::validate_path`]
//! before any mutation. Checks are side-effect free and idempotent.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use crate::io::config::PolicyConfig;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Reason a path was denied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Symlink escape detected: {} -> {}", path.display(), target.display())]
    SymlinkEscape { path: PathBuf, target: PathBuf },
    #[error("Path outside sandbox: {} (sandbox root: {})", path.display(), root.display())]
    OutsideSandbox { path: PathBuf, root: PathBuf },
    #[error("Forbidden system path: {prefix}")]
    ForbiddenPath { path: PathBuf, prefix: String },
    #[error("Forbidden extension: {extension}")]
    ForbiddenExtension { path: PathBuf, extension: String },
    #[error("Disallowed directory in path: {component}")]
    DisallowedDirectory { path: PathBuf, component: String },
    #[error("File too large: {:.2}MB > {}MB", *size_bytes as f64 / BYTES_PER_MB as f64, limit_bytes / BYTES_PER_MB)]
    FileTooLarge {
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },
    #[error("Cannot stat {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Containment rules for one sandbox root.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    root: PathBuf,
    forbidden_extensions: Vec<String>,
    forbidden_paths: Vec<String>,
    max_file_size_bytes: u64,
    disallowed_directories: Vec<String>,
}

impl SecurityPolicy {
    /// Build a policy for `root`. Fails if the root cannot be canonicalized.
    pub fn new(root: &Path, config: &PolicyConfig) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("canonicalize sandbox root {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("sandbox root {} is not a directory", root.display());
        }
        Ok(Self {
            root,
            forbidden_extensions: config
                .forbidden_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            forbidden_paths: config
                .forbidden_paths
                .iter()
                .map(|prefix| normalize_for_prefix(prefix))
                .collect(),
            max_file_size_bytes: config.max_file_size_mb.saturating_mul(BYTES_PER_MB),
            disallowed_directories: config.disallowed_directories.clone(),
        })
    }

    /// Additional directory names that actions may never touch (the engine's
    /// own staging and config directories).
    pub fn with_reserved_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.disallowed_directories.contains(&name) {
                self.disallowed_directories.push(name);
            }
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// True if `path` (already resolved) is the root or lies beneath it.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Resolve `path` to an absolute, symlink-free form.
    ///
    /// Relative paths are taken relative to the sandbox root. Existing
    /// components are resolved through the filesystem; a missing tail is
    /// appended lexically (`..` pops).
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, PolicyViolation> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let mut resolved = PathBuf::new();
        let mut missing = false;
        for component in joined.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(name) => {
                    let candidate = resolved.join(name);
                    if missing {
                        resolved = candidate;
                        continue;
                    }
                    match fs::symlink_metadata(&candidate) {
                        Ok(meta) if meta.file_type().is_symlink() => {
                            let target = symlink_target(&candidate);
                            if self.contains(&candidate) && !self.contains(&target) {
                                return Err(PolicyViolation::SymlinkEscape {
                                    path: candidate,
                                    target,
                                });
                            }
                            resolved = target;
                        }
                        Ok(_) => resolved = candidate,
                        Err(_) => {
                            missing = true;
                            resolved = candidate;
                        }
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Admit `path` and return its resolved form, or explain the denial.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, PolicyViolation> {
        let resolved = self.resolve(path)?;

        let lowered = normalize_for_prefix(&resolved.to_string_lossy());
        if let Some(prefix) = self
            .forbidden_paths
            .iter()
            .find(|prefix| has_prefix(&lowered, prefix))
        {
            return Err(PolicyViolation::ForbiddenPath {
                path: resolved,
                prefix: prefix.clone(),
            });
        }

        if !self.contains(&resolved) {
            debug!(path = %path.display(), resolved = %resolved.display(), "path outside sandbox");
            return Err(PolicyViolation::OutsideSandbox {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }

        if let Some(ext) = resolved.extension() {
            let ext = normalize_extension(&ext.to_string_lossy());
            if self.forbidden_extensions.contains(&ext) {
                return Err(PolicyViolation::ForbiddenExtension {
                    path: resolved,
                    extension: ext,
                });
            }
        }

        let relative = resolved.strip_prefix(&self.root).unwrap_or(Path::new(""));
        let is_repo_dir = relative == Path::new(".git");
        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            if is_repo_dir && name == ".git" {
                continue;
            }
            if self.disallowed_directories.iter().any(|d| *d == name) {
                let component = name.into_owned();
                return Err(PolicyViolation::DisallowedDirectory {
                    path: resolved.clone(),
                    component,
                });
            }
        }

        Ok(resolved)
    }

    /// Reject existing regular files above the size limit. Missing paths pass.
    pub fn validate_size(&self, path: &Path) -> Result<(), PolicyViolation> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(PolicyViolation::Unreadable {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        };
        if meta.is_file() && meta.len() > self.max_file_size_bytes {
            return Err(PolicyViolation::FileTooLarge {
                path: path.to_path_buf(),
                size_bytes: meta.len(),
                limit_bytes: self.max_file_size_bytes,
            });
        }
        Ok(())
    }
}

fn symlink_target(link: &Path) -> PathBuf {
    if let Ok(target) = fs::canonicalize(link) {
        return target;
    }
    // Dangling link: resolve the stored target lexically.
    let raw = fs::read_link(link).unwrap_or_default();
    let base = link.parent().unwrap_or(Path::new("/"));
    let mut out = PathBuf::new();
    for component in base.join(raw).components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn normalize_for_prefix(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_lowercase()
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(root: &Path) -> SecurityPolicy {
        SecurityPolicy::new(root, &PolicyConfig::default()).expect("policy")
    }

    #[test]
    fn relative_traversal_is_normalized_inside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path());
        let resolved = policy
            .validate_path(Path::new("sub/../sub/file"))
            .expect("admit");
        assert_eq!(resolved, policy.root().join("sub/file"));
    }

    #[test]
    fn parent_escape_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path());
        let err = policy
            .validate_path(Path::new("../outside"))
            .expect_err("deny");
        assert!(matches!(err, PolicyViolation::OutsideSandbox { .. }));
        assert!(err.to_string().starts_with("Path outside sandbox"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_outside() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("ws")).expect("mkdir");
        fs::create_dir(temp.path().join("ws2")).expect("mkdir");
        let policy = policy(&temp.path().join("ws"));
        let sibling = policy.root().with_file_name("ws2").join("x.txt");
        assert!(matches!(
            policy.validate_path(&sibling),
            Err(PolicyViolation::OutsideSandbox { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_pointing_outside_is_an_escape() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("outside");
        let policy = policy(temp.path());
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let err = policy
            .validate_path(Path::new("link/secret.txt"))
            .expect_err("deny");
        assert!(matches!(err, PolicyViolation::SymlinkEscape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_is_followed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path());
        fs::create_dir(temp.path().join("real")).expect("mkdir");
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias"))
            .expect("symlink");
        let resolved = policy.validate_path(Path::new("alias/a.txt")).expect("admit");
        assert_eq!(resolved, policy.root().join("real/a.txt"));
    }

    #[test]
    fn forbidden_extension_is_case_insensitive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path());
        let err = policy.validate_path(Path::new("run.SH")).expect_err("deny");
        assert_eq!(err.to_string(), "Forbidden extension: .sh");
    }

    #[test]
    fn system_prefix_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path());
        assert!(matches!(
            policy.validate_path(Path::new("/etc/passwd")),
            Err(PolicyViolation::ForbiddenPath { .. })
        ));
        assert!(!has_prefix("/etcetera", "/etc"));
    }

    #[test]
    fn disallowed_directories_except_top_level_git() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path()).with_reserved_dirs([".engine_backup"]);
        assert!(policy.validate_path(Path::new(".git")).is_ok());
        assert!(matches!(
            policy.validate_path(Path::new(".git/config")),
            Err(PolicyViolation::DisallowedDirectory { .. })
        ));
        assert!(matches!(
            policy.validate_path(Path::new("web/node_modules/x.js")),
            Err(PolicyViolation::DisallowedDirectory { .. })
        ));
        assert!(matches!(
            policy.validate_path(Path::new(".engine_backup/20240101/a")),
            Err(PolicyViolation::DisallowedDirectory { .. })
        ));
    }

    #[test]
    fn validation_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let policy = policy(temp.path());
        let first = policy.validate_path(Path::new("a/./b.txt")).expect("admit");
        let second = policy.validate_path(&first).expect("admit");
        assert_eq!(first, second);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = PolicyConfig {
            max_file_size_mb: 1,
            ..PolicyConfig::default()
        };
        let policy = SecurityPolicy::new(temp.path(), &config).expect("policy");
        let big = temp.path().join("big.bin");
        fs::write(&big, vec![0u8; (BYTES_PER_MB + 1) as usize]).expect("write");
        let err = policy.validate_size(&big).expect_err("too large");
        assert_eq!(err.to_string(), "File too large: 1.00MB > 1MB");
        assert!(policy.validate_size(&temp.path().join("missing")).is_ok());
    }

    #[test]
    fn missing_root_is_a_construction_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(SecurityPolicy::new(&temp.path().join("nope"), &PolicyConfig::default()).is_err());
    }
}
