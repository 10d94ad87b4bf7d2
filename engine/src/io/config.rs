//! Engine configuration stored under `<root>/.engine/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Directory (relative to the sandbox root) holding engine-owned files.
pub const ENGINE_DIR: &str = ".engine";

/// Default location of the config file for a sandbox root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(ENGINE_DIR).join("config.toml")
}

/// Engine configuration (TOML).
///
/// Missing fields default to the values in the `Default` impls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the per-root staging directory for transaction backups.
    pub staging_dir_name: String,

    pub policy: PolicyConfig,
    pub git: GitConfig,
    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Extensions never written or read (case-insensitive, leading dot optional).
    pub forbidden_extensions: Vec<String>,
    /// Absolute system prefixes that are always rejected.
    pub forbidden_paths: Vec<String>,
    pub max_file_size_mb: u64,
    /// Directory names rejected anywhere below the root (`<root>/.git` itself excepted).
    pub disallowed_directories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    /// Executable used for all git subprocesses.
    pub binary: String,
    /// Branch name used by `git init` and remote creation.
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Interpreter prefix; the command string is appended as the last argument.
    pub program: Vec<String>,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Default command for `RunTests`.
    pub test_command: String,
    /// Default command for `BuildProject`.
    pub build_command: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            forbidden_extensions: strings(&[".exe", ".dll", ".so", ".dylib", ".bat", ".sh", ".cmd"]),
            forbidden_paths: strings(&["/etc", "/sys", "/proc", "C:\\Windows"]),
            max_file_size_mb: 10,
            disallowed_directories: strings(&[
                ".git",
                ".svn",
                "node_modules",
                "__pycache__",
                ".pytest_cache",
                ".venv",
            ]),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
            default_branch: "main".to_string(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: strings(&["sh", "-c"]),
            output_limit_bytes: 100_000,
            test_command: "pytest".to_string(),
            build_command: "npm run build".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staging_dir_name: ".engine_backup".to_string(),
            policy: PolicyConfig::default(),
            git: GitConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let staging = self.staging_dir_name.trim();
        if staging.is_empty() || staging == "." || staging == ".." {
            return Err(anyhow!("staging_dir_name must be a plain directory name"));
        }
        if staging.contains(['/', '\\']) {
            return Err(anyhow!("staging_dir_name must not contain path separators"));
        }
        if self.policy.max_file_size_mb == 0 {
            return Err(anyhow!("policy.max_file_size_mb must be > 0"));
        }
        if self.git.binary.trim().is_empty() {
            return Err(anyhow!("git.binary must be non-empty"));
        }
        if self.shell.program.is_empty() || self.shell.program[0].trim().is_empty() {
            return Err(anyhow!("shell.program must be a non-empty array"));
        }
        if self.shell.output_limit_bytes == 0 {
            return Err(anyhow!("shell.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::fsops::write_atomic(path, buf.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = config_path(temp.path());
        let mut cfg = EngineConfig::default();
        cfg.shell.test_command = "cargo test".to_string();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[policy]\nmax_file_size_mb = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.policy.max_file_size_mb, 2);
        assert_eq!(cfg.policy.forbidden_paths, PolicyConfig::default().forbidden_paths);
        assert_eq!(cfg.staging_dir_name, ".engine_backup");
    }

    #[test]
    fn staging_name_with_separator_is_invalid() {
        let cfg = EngineConfig {
            staging_dir_name: "a/b".to_string(),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
