//! File and folder handlers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use crate::core::action::{ActionContext, ActionKind, ActionResult, Params};
use crate::io::fsops::{copy_dir_all, read_text_lossy, write_atomic};
use crate::io::transaction::Transaction;

use super::{ActionSupervisor, content_param, reject};

const CONTENT_KEYS: &[&str] = &["content", "text", "value", "body"];
const SOURCE_KEYS: &[&str] = &["source", "src", "path"];
const FOLDER_DESTINATION_KEYS: &[&str] = &["destination", "dest", "target_folder", "new_path"];
const FILE_DESTINATION_KEYS: &[&str] = &["destination", "dest", "new_path"];

/// Resolve `raw` and require an existing regular file within the size limit.
pub(super) fn existing_file(sup: &ActionSupervisor, kind: ActionKind, raw: &str) -> Result<PathBuf> {
    let path = sup.target(kind, raw)?;
    if !path.exists() {
        return Err(reject(format!("File not found: {raw}"), "File not found"));
    }
    if !path.is_file() {
        return Err(reject(format!("Path is not a file: {raw}"), "Not a file"));
    }
    sup.policy().validate_size(&path)?;
    Ok(path)
}

/// Create missing ancestors of `path`, logging the topmost new directory.
pub(super) fn ensure_parent(path: &Path, tx: &mut Transaction) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    create_dirs(parent, tx)
}

fn create_dirs(dir: &Path, tx: &mut Transaction) -> Result<()> {
    let Some(first_missing) = dir.ancestors().take_while(|p| !p.exists()).last() else {
        return Ok(());
    };
    tx.record_created_folder(first_missing)?;
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))
}

pub(super) fn write_text(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

pub(super) fn create_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["path"])?;
    let path = sup.target(ActionKind::CreateFile, &raw)?;
    if path.exists() {
        return Err(reject(format!("File already exists: {raw}"), "File exists"));
    }
    let content = content_param(params, CONTENT_KEYS);
    ensure_parent(&path, tx)?;
    tx.record_created_file(&path)?;
    write_text(&path, &content)?;
    Ok(ActionResult::success(format!("File created: {}", sup.display_path(&path)))
        .with_data(json!({ "path": sup.display_path(&path), "bytes": content.len() }))
        .with_modified(path))
}

/// EditFile and RewriteEntireFile: replace the whole content of an existing file.
pub(super) fn rewrite_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["path"])?;
    let path = existing_file(sup, ActionKind::EditFile, &raw)?;
    let content = content_param(params, CONTENT_KEYS);
    tx.backup_file(&path)?;
    write_text(&path, &content)?;
    Ok(ActionResult::success(format!("File updated: {}", sup.display_path(&path)))
        .with_data(json!({ "path": sup.display_path(&path), "bytes": content.len() }))
        .with_modified(path))
}

pub(super) fn read_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["path"])?;
    let path = existing_file(sup, ActionKind::ReadFile, &raw)?;
    let content = read_text_lossy(&path)?;
    Ok(ActionResult::success(format!("File read: {}", sup.display_path(&path)))
        .with_data(json!({ "path": sup.display_path(&path), "content": content })))
}

pub(super) fn delete_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["path"])?;
    let path = existing_file(sup, ActionKind::DeleteFile, &raw)?;
    tx.record_deleted_file(&path, false)?;
    fs::remove_file(&path).with_context(|| format!("remove file {}", path.display()))?;
    Ok(ActionResult::success(format!("File deleted: {}", sup.display_path(&path)))
        .with_data(json!({ "path": sup.display_path(&path) }))
        .with_modified(path))
}

/// Source and destination of a move/copy, both admitted by the policy.
fn endpoints(
    sup: &ActionSupervisor,
    kind: ActionKind,
    params: Params<'_>,
    destination_keys: &[&str],
) -> Result<(String, PathBuf, String, PathBuf)> {
    let src_raw = params.require_str(SOURCE_KEYS)?;
    let dst_raw = params.require_str(destination_keys)?;
    let src = sup.target(kind, &src_raw).map_err(|v| reject("Source path security violation", v.to_string()))?;
    let dst = sup
        .target(kind, &dst_raw)
        .map_err(|v| reject("Destination path security violation", v.to_string()))?;
    if !src.exists() {
        return Err(reject(format!("Source not found: {src_raw}"), "Source not found"));
    }
    Ok((src_raw, src, dst_raw, dst))
}

/// An existing directory destination means "into that directory".
fn into_directory(src: &Path, dst: PathBuf) -> PathBuf {
    match src.file_name() {
        Some(name) if dst.is_dir() => dst.join(name),
        _ => dst,
    }
}

/// Move `src` to `dst` under `tx`, backing up anything `dst` replaces.
fn move_path(src: &Path, dst: &Path, tx: &mut Transaction) -> Result<()> {
    if dst.exists() {
        tx.backup(dst)?;
    }
    ensure_parent(dst, tx)?;
    tx.record_renamed(src, dst)?;
    fs::rename(src, dst).with_context(|| format!("rename {} -> {}", src.display(), dst.display()))
}

pub(super) fn move_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (src_raw, src, dst_raw, dst) = endpoints(sup, ActionKind::MoveFile, params, FILE_DESTINATION_KEYS)?;
    if !src.is_file() {
        return Err(reject(format!("Source is not a file: {src_raw}"), "Not a file"));
    }
    let dst = into_directory(&src, dst);
    if dst.is_dir() {
        return Err(reject(format!("Destination is a folder: {dst_raw}"), "Destination is a folder"));
    }
    move_path(&src, &dst, tx)?;
    Ok(ActionResult::success(format!("File moved: {src_raw} -> {dst_raw}"))
        .with_data(json!({ "source": sup.display_path(&src), "destination": sup.display_path(&dst) }))
        .with_modified(src)
        .with_modified(dst))
}

pub(super) fn copy_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (src_raw, src, dst_raw, dst) = endpoints(sup, ActionKind::CopyFile, params, FILE_DESTINATION_KEYS)?;
    if !src.is_file() {
        return Err(reject(format!("Source is not a file: {src_raw}"), "Not a file"));
    }
    let dst = into_directory(&src, dst);
    if dst == src {
        return Err(reject("Source and destination are the same file", "Same file"));
    }
    if dst.is_dir() {
        return Err(reject(format!("Destination is a folder: {dst_raw}"), "Destination is a folder"));
    }
    if dst.exists() {
        tx.backup_file(&dst)?;
    } else {
        ensure_parent(&dst, tx)?;
        tx.record_created_file(&dst)?;
    }
    fs::copy(&src, &dst).with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
    Ok(ActionResult::success(format!("File copied: {src_raw} -> {dst_raw}"))
        .with_data(json!({ "source": sup.display_path(&src), "destination": sup.display_path(&dst) }))
        .with_modified(dst))
}

/// Rename within the same directory; `new_name` must be a bare file name.
pub(super) fn rename_file(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let old_raw = params.require_str(&["old_name", "old", "path"])?;
    let new_name = params.require_str(&["new_name", "new"])?;
    if new_name.contains(['/', '\\']) || new_name == "." || new_name == ".." {
        return Err(reject("new_name should be a filename, not a path", "Invalid new_name"));
    }
    let src = existing_file(sup, ActionKind::RenameFile, &old_raw)?;
    let parent = src.parent().map(Path::to_path_buf).unwrap_or_default();
    let dst = sup.policy().validate_path(&parent.join(&new_name))?;
    if dst.exists() {
        return Err(reject(format!("New path already exists: {new_name}"), "File exists"));
    }
    move_path(&src, &dst, tx)?;
    Ok(ActionResult::success(format!("File renamed: {old_raw} -> {new_name}"))
        .with_data(json!({ "old_path": sup.display_path(&src), "new_path": sup.display_path(&dst) }))
        .with_modified(src)
        .with_modified(dst))
}

pub(super) fn create_folder(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["path"])?;
    let path = sup.target(ActionKind::CreateFolder, &raw)?;
    if path.is_dir() {
        return Ok(ActionResult::success(format!("Folder already exists: {raw}"))
            .with_data(json!({ "path": sup.display_path(&path), "created": false })));
    }
    if path.exists() {
        return Err(reject(format!("A file already exists at: {raw}"), "Not a folder"));
    }
    create_dirs(&path, tx)?;
    Ok(ActionResult::success(format!("Folder created: {raw}"))
        .with_data(json!({ "path": sup.display_path(&path), "created": true }))
        .with_modified(path))
}

pub(super) fn delete_folder(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["path"])?;
    let path = sup.target(ActionKind::DeleteFolder, &raw)?;
    if !path.exists() {
        return Err(reject(format!("Folder not found: {raw}"), "Folder not found"));
    }
    if !path.is_dir() {
        return Err(reject(format!("Path is not a folder: {raw}"), "Not a folder"));
    }
    if path == sup.sandbox_root() {
        return Err(reject("Refusing to delete the sandbox root", "Sandbox root"));
    }
    tx.record_deleted_folder(&path, false)?;
    fs::remove_dir_all(&path).with_context(|| format!("remove directory {}", path.display()))?;
    sup.retreat_view_from(&path);
    Ok(ActionResult::success(format!("Folder deleted: {raw}"))
        .with_data(json!({ "path": sup.display_path(&path) }))
        .with_modified(path))
}

pub(super) fn move_folder(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (src_raw, src, dst_raw, dst) = endpoints(sup, ActionKind::MoveFolder, params, FOLDER_DESTINATION_KEYS)?;
    if !src.is_dir() {
        return Err(reject(format!("Source is not a folder: {src_raw}"), "Not a folder"));
    }
    if src == sup.sandbox_root() {
        return Err(reject("Refusing to move the sandbox root", "Sandbox root"));
    }
    let dst = into_directory(&src, dst);
    if dst.starts_with(&src) {
        return Err(reject("Cannot move a folder into itself", "Destination inside source"));
    }
    if dst.exists() {
        return Err(reject(format!("Destination already exists: {dst_raw}"), "Destination exists"));
    }
    move_path(&src, &dst, tx)?;
    sup.retreat_view_from(&src);
    Ok(ActionResult::success(format!("Folder moved: {src_raw} -> {dst_raw}"))
        .with_data(json!({ "source": sup.display_path(&src), "destination": sup.display_path(&dst) }))
        .with_modified(src)
        .with_modified(dst))
}

/// Copy a folder tree; an existing destination is merged into (and backed up first).
pub(super) fn copy_folder(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (src_raw, src, dst_raw, dst) = endpoints(sup, ActionKind::CopyFolder, params, FOLDER_DESTINATION_KEYS)?;
    if !src.is_dir() {
        return Err(reject(format!("Source is not a folder: {src_raw}"), "Not a folder"));
    }
    if dst.starts_with(&src) {
        return Err(reject("Cannot copy a folder into itself", "Destination inside source"));
    }
    if dst.is_dir() {
        tx.backup_folder(&dst)?;
    } else if dst.exists() {
        return Err(reject(format!("Destination is a file: {dst_raw}"), "Not a folder"));
    } else {
        ensure_parent(&dst, tx)?;
        tx.record_created_folder(&dst)?;
    }
    let copied = copy_dir_all(&src, &dst)?;
    Ok(ActionResult::success(format!("Folder copied: {src_raw} -> {dst_raw}"))
        .with_data(json!({
            "source": sup.display_path(&src),
            "destination": sup.display_path(&dst),
            "files": copied,
        }))
        .with_modified(dst))
}
