//! Backup-and-restore transactions over the sandbox filesystem.
//!
//! A [`Transaction`] records every backup and every create/delete/rename an
//! action performs. [`Transaction::rollback`] replays the log in reverse,
//! best-effort; [`Transaction::commit`] discards the backups. Either way the
//! staging directory `<root>/<staging>/<timestamp>/` is removed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::io::fsops::{copy_dir_all, remove_path};

/// One reversible step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    FileBackup { original: PathBuf, backup: PathBuf },
    FolderBackup { original: PathBuf, backup: PathBuf },
    FileCreated(PathBuf),
    FolderCreated(PathBuf),
    FileDeleted { original: PathBuf, backup: Option<PathBuf> },
    FolderDeleted { original: PathBuf, backup: Option<PathBuf> },
    Renamed {
        from: PathBuf,
        to: PathBuf,
        backup: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction already committed")]
    Committed,
    #[error("transaction already rolled back")]
    RolledBack,
}

/// What a rollback managed to undo, and which steps failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub restored: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct Transaction {
    root: PathBuf,
    staging: PathBuf,
    staging_created: bool,
    next_slot: usize,
    log: Vec<LogEntry>,
    state: TransactionState,
}

impl Transaction {
    /// Open a transaction. Nothing touches the disk until the first backup.
    pub fn begin(root: &Path, staging_dir_name: &str) -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        Self {
            root: root.to_path_buf(),
            staging: root.join(staging_dir_name).join(timestamp),
            staging_created: false,
            next_slot: 0,
            log: Vec::new(),
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Staging directory path (it only exists once something was backed up).
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    fn ensure_open(&self) -> Result<(), TransactionError> {
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Committed => Err(TransactionError::Committed),
            TransactionState::RolledBack => Err(TransactionError::RolledBack),
        }
    }

    fn ensure_staging(&mut self) -> Result<()> {
        if self.staging_created {
            return Ok(());
        }
        let base = self.staging.clone();
        let mut suffix = 1;
        while self.staging.exists() {
            self.staging = base.with_file_name(format!(
                "{}_{suffix}",
                base.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ));
            suffix += 1;
        }
        fs::create_dir_all(&self.staging)
            .with_context(|| format!("create staging dir {}", self.staging.display()))?;
        self.staging_created = true;
        debug!(staging = %self.staging.display(), "created staging dir");
        Ok(())
    }

    /// Each backup gets its own numbered slot so repeated backups of one path
    /// never overwrite the original copy.
    fn next_backup_path(&mut self, original: &Path) -> Result<PathBuf> {
        self.ensure_staging()?;
        let slot = self.next_slot;
        self.next_slot += 1;
        let rel = original
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(original.file_name().unwrap_or_default()));
        Ok(self.staging.join(slot.to_string()).join(rel))
    }

    /// Copy an existing file into staging. Returns `None` if it does not exist.
    pub fn backup_file(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        self.ensure_open()?;
        if !path.is_file() {
            return Ok(None);
        }
        let backup = self.next_backup_path(path)?;
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create backup dir {}", parent.display()))?;
        }
        fs::copy(path, &backup)
            .with_context(|| format!("back up {} -> {}", path.display(), backup.display()))?;
        self.log.push(LogEntry::FileBackup {
            original: path.to_path_buf(),
            backup: backup.clone(),
        });
        Ok(Some(backup))
    }

    /// Copy an existing directory tree into staging.
    pub fn backup_folder(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        self.ensure_open()?;
        if !path.is_dir() {
            return Ok(None);
        }
        let backup = self.next_backup_path(path)?;
        copy_dir_all(path, &backup)
            .with_context(|| format!("back up folder {}", path.display()))?;
        self.log.push(LogEntry::FolderBackup {
            original: path.to_path_buf(),
            backup: backup.clone(),
        });
        Ok(Some(backup))
    }

    /// Back up whatever currently exists at `path`.
    pub fn backup(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if path.is_dir() {
            self.backup_folder(path)
        } else {
            self.backup_file(path)
        }
    }

    pub fn record_created_file(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;
        self.log.push(LogEntry::FileCreated(path.to_path_buf()));
        Ok(())
    }

    pub fn record_created_folder(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;
        self.log.push(LogEntry::FolderCreated(path.to_path_buf()));
        Ok(())
    }

    /// Record that `path` is about to be deleted.
    ///
    /// Pass `skip_backup` when an earlier backup entry already covers it.
    pub fn record_deleted_file(&mut self, path: &Path, skip_backup: bool) -> Result<()> {
        self.ensure_open()?;
        let backup = if skip_backup {
            None
        } else {
            self.copy_for_delete(path, false)?
        };
        self.log.push(LogEntry::FileDeleted {
            original: path.to_path_buf(),
            backup,
        });
        Ok(())
    }

    pub fn record_deleted_folder(&mut self, path: &Path, skip_backup: bool) -> Result<()> {
        self.ensure_open()?;
        let backup = if skip_backup {
            None
        } else {
            self.copy_for_delete(path, true)?
        };
        self.log.push(LogEntry::FolderDeleted {
            original: path.to_path_buf(),
            backup,
        });
        Ok(())
    }

    fn copy_for_delete(&mut self, path: &Path, folder: bool) -> Result<Option<PathBuf>> {
        let exists = if folder { path.is_dir() } else { path.is_file() };
        if !exists {
            return Ok(None);
        }
        let backup = self.next_backup_path(path)?;
        if folder {
            copy_dir_all(path, &backup)?;
        } else {
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create backup dir {}", parent.display()))?;
            }
            fs::copy(path, &backup)
                .with_context(|| format!("back up {} -> {}", path.display(), backup.display()))?;
        }
        Ok(Some(backup))
    }

    /// Record a rename of `from` to `to`, backing up `from` first.
    pub fn record_renamed(&mut self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_open()?;
        let backup = if from.exists() {
            self.copy_for_delete(from, from.is_dir())?
        } else {
            None
        };
        self.log.push(LogEntry::Renamed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Keep all changes and discard backups.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        self.ensure_open()?;
        self.state = TransactionState::Committed;
        debug!(entries = self.log.len(), "transaction committed");
        self.cleanup();
        Ok(())
    }

    /// Undo every logged step in reverse order.
    ///
    /// A failing step is logged and recorded in the report; the remaining
    /// steps still run.
    pub fn rollback(&mut self) -> Result<RollbackReport, TransactionError> {
        if self.state == TransactionState::Committed {
            warn!("refusing to roll back a committed transaction");
        }
        self.ensure_open()?;
        self.state = TransactionState::RolledBack;

        let mut report = RollbackReport::default();
        if !self.log.is_empty() {
            warn!(entries = self.log.len(), "rolling back transaction");
        }
        for entry in self.log.iter().rev() {
            if let Err(err) = undo(entry, &mut report) {
                error!(?entry, err = %format!("{err:#}"), "rollback step failed");
                report.failures.push(format!("{err:#}"));
            }
        }
        self.cleanup();
        Ok(report)
    }

    fn cleanup(&mut self) {
        if !self.staging_created {
            return;
        }
        if let Err(err) = remove_path(&self.staging) {
            error!(staging = %self.staging.display(), err = %format!("{err:#}"), "failed to clean staging dir");
            return;
        }
        self.staging_created = false;
        // The shared parent only goes away once no other transaction uses it.
        if let Some(parent) = self.staging.parent() {
            let _ = fs::remove_dir(parent);
        }
    }
}

fn undo(entry: &LogEntry, report: &mut RollbackReport) -> Result<()> {
    match entry {
        LogEntry::FileCreated(path) | LogEntry::FolderCreated(path) => {
            if fs::symlink_metadata(path).is_ok() {
                remove_path(path)?;
                info!(path = %path.display(), "rollback: removed");
                report.removed.push(path.clone());
            }
        }
        LogEntry::FileBackup { original, backup } => {
            restore_file(backup, original)?;
            report.restored.push(original.clone());
        }
        LogEntry::FileDeleted { original, backup } => {
            if let Some(backup) = backup {
                restore_file(backup, original)?;
                report.restored.push(original.clone());
            }
        }
        LogEntry::FolderBackup { original, backup } => {
            restore_folder(backup, original)?;
            report.restored.push(original.clone());
        }
        LogEntry::FolderDeleted { original, backup } => {
            if let Some(backup) = backup {
                restore_folder(backup, original)?;
                report.restored.push(original.clone());
            }
        }
        LogEntry::Renamed { from, to, backup } => {
            if fs::symlink_metadata(to).is_ok() {
                remove_path(to)?;
                report.removed.push(to.clone());
            }
            if let Some(backup) = backup {
                if backup.is_dir() {
                    restore_folder(backup, from)?;
                } else {
                    restore_file(backup, from)?;
                }
                info!(from = %to.display(), to = %from.display(), "rollback: rename reverted");
                report.restored.push(from.clone());
            }
        }
    }
    Ok(())
}

fn restore_file(backup: &Path, original: &Path) -> Result<()> {
    if original.is_dir() {
        remove_path(original)?;
    }
    if let Some(parent) = original.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::copy(backup, original)
        .with_context(|| format!("restore {} from {}", original.display(), backup.display()))?;
    info!(path = %original.display(), "rollback: restored file");
    Ok(())
}

fn restore_folder(backup: &Path, original: &Path) -> Result<()> {
    remove_path(original)?;
    copy_dir_all(backup, original)
        .with_context(|| format!("restore folder {}", original.display()))?;
    info!(path = %original.display(), "rollback: restored folder");
    Ok(())
}
