//! Project-wide handlers: search, find/replace, tree rendering and module scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::{NoExpand, Regex};
use serde_json::{Value, json};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::action::{Action, ActionContext, ActionKind, ActionResult, Params};
use crate::core::pattern::RegexFlags;
use crate::io::config::ENGINE_DIR;
use crate::io::fsops::{is_probably_binary, read_text};
use crate::io::transaction::Transaction;

use super::files::write_text;
use super::{ActionSupervisor, compose, reject};

const CONTEXT_CHARS: usize = 40;
const DEFAULT_DEPTH: usize = 5;

fn is_skipped_dir(sup: &ActionSupervisor, name: &str) -> bool {
    let config = sup.config();
    name == config.staging_dir_name
        || name == ENGINE_DIR
        || config.policy.disallowed_directories.iter().any(|d| d == name)
}

/// Regular files below `base` that the policy admits, skipping disallowed
/// directories without descending into them.
pub(super) fn admitted_files(sup: &ActionSupervisor, base: &Path) -> Vec<PathBuf> {
    let walker = WalkDir::new(base).follow_links(false).sort_by_file_name().into_iter();
    walker
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !is_skipped_dir(sup, &entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| sup.policy().validate_path(entry.path()).ok())
        .collect()
}

fn glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern.trim())
            .literal_separator(true)
            .build()
            .map_err(|err| reject(format!("Invalid file pattern: {pattern}"), err.to_string()))?;
        builder.add(glob);
    }
    builder.build().context("build glob set")
}

/// Files under the current view matching the `patterns` param (default `**/*`),
/// readable as text and within the size limit.
fn candidate_files(sup: &ActionSupervisor, params: Params<'_>) -> Result<Vec<PathBuf>> {
    let patterns = params
        .strings(&["patterns", "pattern", "file_pattern"])
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| vec!["**/*".to_string()]);
    let globs = glob_set(&patterns)?;
    let view = sup.current_view();
    Ok(admitted_files(sup, &view)
        .into_iter()
        .filter(|path| path.strip_prefix(&view).is_ok_and(|rel| globs.is_match(rel)))
        .filter(|path| sup.policy().validate_size(path).is_ok())
        .filter(|path| !is_probably_binary(path))
        .collect())
}

fn query_regex(query: &str, use_regex: bool, case_insensitive: bool) -> Result<Regex> {
    let pattern = if use_regex { query.to_string() } else { regex::escape(query) };
    let flags = RegexFlags {
        case_insensitive,
        multi_line: true,
        ..RegexFlags::default()
    };
    flags
        .compile(&pattern)
        .map_err(|err| reject("Invalid regular expression", err.to_string()))
}

/// Up to [`CONTEXT_CHARS`] bytes either side of `start..end`, snapped to char boundaries.
fn context_around(text: &str, start: usize, end: usize) -> &str {
    let mut from = start.saturating_sub(CONTEXT_CHARS);
    while !text.is_char_boundary(from) {
        from += 1;
    }
    let mut to = (end + CONTEXT_CHARS).min(text.len());
    while !text.is_char_boundary(to) {
        to -= 1;
    }
    text[from..to].trim()
}

pub(super) fn search_files(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let query = params.require_str(&["query", "search", "pattern_text"])?;
    let re = query_regex(
        &query,
        params.bool(&["use_regex", "regex"], false),
        params.bool(&["case_insensitive", "ignore_case"], false),
    )?;
    let files = candidate_files(sup, params)?;

    let mut matches: Vec<Value> = Vec::new();
    for path in &files {
        let Ok(text) = read_text(path) else {
            continue;
        };
        for found in re.find_iter(&text) {
            let line = text[..found.start()].matches('\n').count() + 1;
            matches.push(json!({
                "file": sup.display_path(path),
                "line": line,
                "match": found.as_str(),
                "context": context_around(&text, found.start(), found.end()),
            }));
        }
    }
    debug!(files = files.len(), matches = matches.len(), "search finished");
    Ok(ActionResult::success(format!("Search completed: found {} matches", matches.len()))
        .with_data(json!({ "query": query, "count": matches.len(), "matches": matches })))
}

pub(super) fn find_replace(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let find = params.require_str(&["find", "search", "old_text"])?;
    if find.is_empty() {
        return Err(reject("Search text must not be empty", "Empty find"));
    }
    let replace = params.text(&["replace", "replacement", "new_text"]);
    let use_regex = params.bool(&["use_regex", "regex"], false);
    let re = query_regex(&find, use_regex, params.bool(&["case_insensitive", "ignore_case"], false))?;
    let files = candidate_files(sup, params)?;

    let mut result = ActionResult::success("");
    let mut modified = Vec::new();
    for path in files {
        let Ok(text) = read_text(&path) else {
            continue;
        };
        if !re.is_match(&text) {
            continue;
        }
        let updated = if use_regex {
            re.replace_all(&text, replace.as_str())
        } else {
            re.replace_all(&text, NoExpand(&replace))
        };
        if updated == text {
            continue;
        }
        tx.backup_file(&path)?;
        write_text(&path, &updated)?;
        modified.push(sup.display_path(&path));
        result = result.with_modified(path);
    }
    result.message = format!("Find/replace completed: {} files modified", modified.len());
    Ok(result.with_data(json!({ "find": find, "replace": replace, "modified_files": modified })))
}

struct TreeOptions<'a> {
    sup: &'a ActionSupervisor,
    max_depth: usize,
    include_hidden: bool,
}

fn render_tree(dir: &Path, prefix: &str, depth: usize, opts: &TreeOptions<'_>, lines: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), err = %err, "cannot list directory");
            return;
        }
    };
    let mut children: Vec<(String, bool)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            (entry.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .filter(|(name, _)| opts.include_hidden || !name.starts_with('.'))
        .filter(|(name, is_dir)| !(*is_dir && is_skipped_dir(opts.sup, name)))
        .collect();
    children.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase())));

    if depth >= opts.max_depth {
        if !children.is_empty() {
            lines.push(format!("{prefix}└── ... (max depth reached)"));
        }
        return;
    }
    let last = children.len().saturating_sub(1);
    for (idx, (name, is_dir)) in children.iter().enumerate() {
        let (connector, extension) = if idx == last { ("└── ", "    ") } else { ("├── ", "│   ") };
        if *is_dir {
            lines.push(format!("{prefix}{connector}{name}/"));
            render_tree(&dir.join(name), &format!("{prefix}{extension}"), depth + 1, opts, lines);
        } else {
            lines.push(format!("{prefix}{connector}{name}"));
        }
    }
}

/// Text tree of the current view, directories first.
pub(super) fn generate_project_structure(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let opts = TreeOptions {
        sup,
        max_depth: params.usize(&["max_depth", "depth"])?.unwrap_or(DEFAULT_DEPTH),
        include_hidden: params.bool(&["include_hidden", "show_hidden"], false),
    };
    let view = sup.current_view();
    let name = view
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| view.display().to_string());
    let mut lines = vec![format!("{name}/")];
    render_tree(&view, "", 0, &opts, &mut lines);
    let structure = lines.join("\n");
    Ok(ActionResult::success(format!("Project structure generated: {} entries", lines.len() - 1))
        .with_data(json!({ "structure": structure, "lines": lines.len() })))
}

/// A Python package skeleton created as one atomic group.
pub(super) fn scaffold_module(
    sup: &ActionSupervisor,
    params: Params<'_>,
    ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let raw = params.require_str(&["name", "module_name"])?;
    let raw = raw.trim().trim_end_matches('/');
    let path = sup.target(ActionKind::ScaffoldModule, raw)?;
    if path.exists() {
        return Err(reject(format!("Module already exists: {raw}"), "Module exists"));
    }
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| reject(format!("Invalid module name: {raw}"), "Invalid name"))?;
    let rel = sup.display_path(&path);

    // Absolute paths: sub-actions resolve relative ones against the view.
    let files = [
        ("__init__.py".to_string(), String::new()),
        (format!("{stem}.py"), format!("\"\"\"{stem} module\"\"\"\n")),
        ("tests/__init__.py".to_string(), String::new()),
        (format!("tests/test_{stem}.py"), "import unittest\n\n".to_string()),
    ];
    let absolute = |sub: &str| path.join(sub).to_string_lossy().into_owned();
    let mut actions = vec![
        Action::new("CreateFolder", json!({ "path": path.to_string_lossy() })),
        Action::new("CreateFolder", json!({ "path": absolute("tests") })),
    ];
    actions.extend(
        files
            .iter()
            .map(|(sub, content)| Action::new("CreateFile", json!({ "path": absolute(sub), "content": content }))),
    );
    let group = compose::run_atomic(sup, &actions, ctx, tx);
    if !group.is_success() {
        return Ok(group);
    }
    let files: Vec<String> = files.iter().map(|(sub, _)| format!("{rel}/{sub}")).collect();
    Ok(ActionResult::success(format!("Module scaffolded: {rel}"))
        .with_data(json!({ "path": rel, "files": files }))
        .with_sub_results(group.sub_results))
}
