//! Content-editing handlers.
//!
//! Each handler parses its parameters, then runs one pure edit from
//! [`crate::core`] over the current file content. The file is backed up and
//! rewritten only when the edit succeeds.

use anyhow::Result;
use serde_json::Value;

use crate::core::action::{ActionContext, ActionKind, ActionResult, ParamError, Params};
use crate::core::edit::{EditError, EditOutcome, TextBuffer};
use crate::core::keys::{update_json_key as json_key, update_yaml_key as yaml_key};
use crate::core::lines;
use crate::core::pattern::{RegexFlags, delete_pattern, replace_exact, replace_pattern};
use crate::core::similarity::{DEFAULT_THRESHOLD, replace_fuzzy};
use crate::core::structure::{self, Position};
use crate::io::fsops::read_text;
use crate::io::transaction::Transaction;

use super::files::{existing_file, write_text};
use super::{ActionSupervisor, content_param, reject};

const FILE_KEYS: &[&str] = &["path", "file", "file_path"];
const BLOCK_KEYS: &[&str] = &["block", "content", "text", "value", "body"];
const LINE_KEYS: &[&str] = &["line_number", "line"];

/// Apply `edit` to the file named by `params` and write the result back.
fn edit_file<E, F>(
    sup: &ActionSupervisor,
    kind: ActionKind,
    params: Params<'_>,
    tx: &mut Transaction,
    edit: F,
) -> Result<ActionResult>
where
    E: Into<anyhow::Error>,
    F: FnOnce(&str) -> Result<EditOutcome, E>,
{
    let raw = params.require_str(FILE_KEYS)?;
    let path = existing_file(sup, kind, &raw)?;
    let before = read_text(&path)?;
    let outcome = edit(&before).map_err(Into::<anyhow::Error>::into)?;
    tx.backup_file(&path)?;
    write_text(&path, &outcome.content)?;

    let shown = sup.display_path(&path);
    let mut details = outcome.details;
    details.insert("path".to_string(), Value::String(shown.clone()));
    Ok(ActionResult::success(format!("{kind}: {} in {shown}", outcome.summary))
        .with_data(Value::Object(details))
        .with_modified(path))
}

/// Non-empty string used verbatim (no trimming).
fn required_text(params: Params<'_>, keys: &[&str]) -> Result<String, ParamError> {
    params
        .str(keys)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParamError::Missing(keys.join("|")))
}

/// Inclusive range from `start_line`/`end_line`, or a single `line_number`.
/// A missing end means a one-line range.
fn line_range(params: Params<'_>) -> Result<(usize, usize), ParamError> {
    let single = params.usize(LINE_KEYS)?;
    let start = params
        .usize(&["start_line", "start"])?
        .or(single)
        .ok_or_else(|| ParamError::Missing("start_line".to_string()))?;
    let end = params.usize(&["end_line", "end"])?.or(single).unwrap_or(start);
    Ok((start, end))
}

/// `flags` as letters (`"im"`) or an integer bit set.
fn regex_flags(params: Params<'_>) -> Result<RegexFlags, EditError> {
    match params.value(&["flags"]) {
        None => Ok(RegexFlags::default()),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| EditError::InvalidFlags(n.to_string()))
            .and_then(RegexFlags::from_bits),
        Some(Value::String(s)) => match s.trim().parse::<u64>() {
            Ok(bits) => RegexFlags::from_bits(bits),
            Err(_) => RegexFlags::from_letters(s),
        },
        Some(other) => Err(EditError::InvalidFlags(other.to_string())),
    }
}

fn position(params: Params<'_>) -> Result<Position, ParamError> {
    match params.str(&["position"]) {
        None => Ok(Position::default()),
        Some(raw) => raw.parse().map_err(|reason| ParamError::Invalid {
            name: "position".to_string(),
            reason,
        }),
    }
}

pub(super) fn insert_at_top(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let block = content_param(params, BLOCK_KEYS);
    edit_file(sup, ActionKind::InsertAtTop, params, tx, |content| lines::insert_at_top(content, &block))
}

pub(super) fn insert_at_bottom(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let block = content_param(params, BLOCK_KEYS);
    edit_file(sup, ActionKind::InsertAtBottom, params, tx, |content| {
        lines::insert_at_bottom(content, &block)
    })
}

pub(super) fn insert_before_line(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let line = params.usize(LINE_KEYS)?.unwrap_or(1);
    let text = content_param(params, BLOCK_KEYS);
    edit_file(sup, ActionKind::InsertBeforeLine, params, tx, |content| {
        lines::insert_before_line(content, line, &text)
    })
}

pub(super) fn insert_after_line(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let line = params.usize(LINE_KEYS)?;
    let text = content_param(params, BLOCK_KEYS);
    edit_file(sup, ActionKind::InsertAfterLine, params, tx, |content| {
        let line = line.unwrap_or_else(|| TextBuffer::parse(content).len().max(1));
        lines::insert_after_line(content, line, &text)
    })
}

pub(super) fn insert_block_at_line(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let line = params.require_usize(LINE_KEYS)?;
    let block = content_param(params, BLOCK_KEYS);
    edit_file(sup, ActionKind::InsertBlockAtLine, params, tx, |content| {
        lines::insert_block_at_line(content, line, &block)
    })
}

pub(super) fn delete_line_range(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (start, end) = line_range(params)?;
    edit_file(sup, ActionKind::DeleteLineRange, params, tx, |content| {
        lines::delete_line_range(content, start, end)
    })
}

pub(super) fn replace_block(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (start, end) = line_range(params)?;
    let block = content_param(params, BLOCK_KEYS);
    edit_file(sup, ActionKind::ReplaceBlock, params, tx, |content| {
        lines::replace_block(content, start, end, &block)
    })
}

pub(super) fn remove_block(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (start, end) = line_range(params)?;
    edit_file(sup, ActionKind::RemoveBlock, params, tx, |content| {
        lines::remove_block(content, start, end)
    })
}

pub(super) fn replace_text(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let old = strip(required_text(params, &["old_text", "old", "find"])?);
    let new = content_param(params, &["new_text", "new", "replace"]);
    let count = params.usize(&["count"])?;
    edit_file(sup, ActionKind::ReplaceText, params, tx, |content| {
        replace_exact(content, &old, &new, count)
    })
}

/// Replace the first occurrence of `original_snippet` with `new_snippet`.
pub(super) fn apply_patch(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let original = strip(required_text(params, &["original_snippet", "old_text"])?);
    let replacement = content_param(params, &["new_snippet", "new_text"]);
    edit_file(sup, ActionKind::ApplyPatch, params, tx, |content| {
        replace_exact(content, &original, &replacement, Some(1)).map_err(|err| match err {
            EditError::TextNotFound(_) => reject("Original snippet not found in file. Patch failed.", err.to_string()),
            other => other.into(),
        })
    })
}

pub(super) fn replace_by_pattern(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let pattern = required_text(params, &["pattern", "regex"])?;
    let replacement = content_param(params, &["replacement", "new_text", "replace"]);
    let flags = regex_flags(params)?;
    edit_file(sup, ActionKind::ReplaceByPattern, params, tx, |content| {
        replace_pattern(content, &pattern, &replacement, flags)
    })
}

pub(super) fn delete_by_pattern(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let pattern = required_text(params, &["pattern", "regex"])?;
    let flags = regex_flags(params)?;
    edit_file(sup, ActionKind::DeleteByPattern, params, tx, |content| {
        delete_pattern(content, &pattern, flags)
    })
}

pub(super) fn replace_by_fuzzy_match(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let target = strip(required_text(params, &["target", "old_text"])?);
    let replacement = content_param(params, &["replacement", "new_text"]);
    let threshold = params.f64(&["threshold"])?.unwrap_or(DEFAULT_THRESHOLD);
    edit_file(sup, ActionKind::ReplaceByFuzzyMatch, params, tx, |content| {
        replace_fuzzy(content, &target, &replacement, threshold)
    })
}

fn key_update(params: Params<'_>) -> Result<(String, Value), ParamError> {
    let key_path = params.require_str(&["key_path", "key"])?;
    let value = params
        .0
        .get("value")
        .cloned()
        .ok_or_else(|| ParamError::Missing("value".to_string()))?;
    Ok((key_path, value))
}

pub(super) fn update_json_key(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (key_path, value) = key_update(params)?;
    edit_file(sup, ActionKind::UpdateJsonKey, params, tx, |content| {
        json_key(content, &key_path, value)
    })
}

pub(super) fn update_yaml_key(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let (key_path, value) = key_update(params)?;
    edit_file(sup, ActionKind::UpdateYamlKey, params, tx, |content| {
        yaml_key(content, &key_path, value)
    })
}

pub(super) fn insert_into_function(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let name = params.require_str(&["function_name", "name"])?;
    let block = content_param(params, BLOCK_KEYS);
    let position = position(params)?;
    edit_file(sup, ActionKind::InsertIntoFunction, params, tx, |content| {
        structure::insert_into_function(content, &name, &block, position)
    })
}

pub(super) fn insert_into_class(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let name = params.require_str(&["class_name", "name"])?;
    let block = content_param(params, BLOCK_KEYS);
    let position = position(params)?;
    edit_file(sup, ActionKind::InsertIntoClass, params, tx, |content| {
        structure::insert_into_class(content, &name, &block, position)
    })
}

pub(super) fn add_decorator(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let target = params.require_str(&["target_name", "target", "name"])?;
    let decorator = params.require_str(&["decorator", "text"])?;
    edit_file(sup, ActionKind::AddDecorator, params, tx, |content| {
        structure::add_decorator(content, &target, &decorator)
    })
}

pub(super) fn add_import(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    tx: &mut Transaction,
) -> Result<ActionResult> {
    let symbol = params.require_str(&["symbol", "name"])?;
    let import_path = params.str(&["import_path", "module", "from"]);
    edit_file(sup, ActionKind::AddImport, params, tx, |content| {
        structure::add_import(content, &symbol, import_path.as_deref().map(str::trim))
    })
}

fn strip(text: String) -> String {
    crate::core::sanitize::strip_ansi(&text)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::core::action::{Action, ActionStatus};
    use crate::io::config::EngineConfig;

    fn setup(name: &str, content: &str) -> (tempfile::TempDir, ActionSupervisor) {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(name), content).expect("write");
        let sup = ActionSupervisor::new(temp.path(), EngineConfig::default()).expect("supervisor");
        (temp, sup)
    }

    fn run(sup: &ActionSupervisor, kind: &str, params: Value) -> ActionResult {
        sup.dispatch(&Action::new(kind, params), &ActionContext::default())
    }

    fn read(temp: &tempfile::TempDir, name: &str) -> String {
        fs::read_to_string(temp.path().join(name)).expect("read")
    }

    #[test]
    fn insert_after_defaults_to_last_line() {
        let (temp, sup) = setup("a.txt", "one\ntwo\n");
        let result = run(&sup, "InsertAfterLine", json!({"path": "a.txt", "text": "three"}));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(read(&temp, "a.txt"), "one\ntwo\nthree\n");
    }

    #[test]
    fn delete_single_line_by_line_number() {
        let (temp, sup) = setup("a.txt", "one\ntwo\nthree\n");
        let result = run(&sup, "DeleteLineRange", json!({"path": "a.txt", "line_number": 2}));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(read(&temp, "a.txt"), "one\nthree\n");
    }

    #[test]
    fn inverted_range_fails_and_leaves_file_untouched() {
        let (temp, sup) = setup("a.txt", "one\ntwo\nthree\n");
        let result = run(&sup, "DeleteLineRange", json!({"path": "a.txt", "start_line": 3, "end_line": 1}));
        assert_eq!(result.status, ActionStatus::Failure);
        assert_eq!(result.message, "DeleteLineRange failed");
        assert_eq!(read(&temp, "a.txt"), "one\ntwo\nthree\n");
        assert!(!temp.path().join(".engine_backup").exists());
    }

    #[test]
    fn apply_patch_replaces_only_first_occurrence() {
        let (temp, sup) = setup("a.py", "x = 1\nx = 1\n");
        let result = run(&sup, "ApplyPatch", json!({
            "path": "a.py", "original_snippet": "x = 1", "new_snippet": "x = 2"
        }));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(read(&temp, "a.py"), "x = 2\nx = 1\n");

        let missing = run(&sup, "ApplyPatch", json!({
            "path": "a.py", "original_snippet": "y = 3", "new_snippet": "y = 4"
        }));
        assert_eq!(missing.message, "Original snippet not found in file. Patch failed.");
    }

    #[test]
    fn pattern_flags_accept_letters_and_bits() {
        let (temp, sup) = setup("a.txt", "Hello\nhello\n");
        let result = run(&sup, "ReplaceByPattern", json!({
            "path": "a.txt", "pattern": "^hello$", "replacement": "bye", "flags": "im"
        }));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(read(&temp, "a.txt"), "bye\nbye\n");

        let result = run(&sup, "DeleteByPattern", json!({"path": "a.txt", "pattern": "BYE\\n", "flags": 2}));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(read(&temp, "a.txt"), "");
    }

    #[test]
    fn fuzzy_below_threshold_reports_failure() {
        let (temp, sup) = setup("a.txt", "alpha\nbeta\n");
        let result = run(&sup, "ReplaceByFuzzyMatch", json!({
            "path": "a.txt", "target": "zzzzzz", "replacement": "gamma", "threshold": 0.9
        }));
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(result.error.expect("error").contains("0."));
        assert_eq!(read(&temp, "a.txt"), "alpha\nbeta\n");
    }

    #[test]
    fn update_json_key_in_file() {
        let (temp, sup) = setup("cfg.json", r#"{"a":{"b":1}}"#);
        let result = run(&sup, "UpdateJSONKey", json!({"path": "cfg.json", "key_path": "a.c", "value": 42}));
        assert!(result.is_success(), "{result:?}");
        let parsed: Value = serde_json::from_str(&read(&temp, "cfg.json")).expect("json");
        assert_eq!(parsed, json!({"a": {"b": 1, "c": 42}}));
    }

    #[test]
    fn update_key_requires_value() {
        let (_temp, sup) = setup("cfg.json", "{}");
        let result = run(&sup, "UpdateJSONKey", json!({"path": "cfg.json", "key_path": "a"}));
        assert_eq!(result.error.as_deref(), Some("missing parameter: value"));
    }

    #[test]
    fn insert_into_function_with_position() {
        let (temp, sup) = setup("m.py", "def run():\n    a = 1\n");
        let result = run(&sup, "InsertIntoFunction", json!({
            "path": "m.py", "function_name": "run", "block": "b = 2", "position": "bottom"
        }));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(read(&temp, "m.py"), "def run():\n    a = 1\n    b = 2\n");

        let bad = run(&sup, "InsertIntoFunction", json!({
            "path": "m.py", "function_name": "run", "block": "c", "position": "middle"
        }));
        assert_eq!(bad.message, "InsertIntoFunction: invalid parameters");
    }

    #[test]
    fn add_import_and_decorator() {
        let (temp, sup) = setup("m.py", "import os\n\ndef run():\n    pass\n");
        assert!(run(&sup, "AddImport", json!({"path": "m.py", "symbol": "sys"})).is_success());
        assert!(run(&sup, "AddDecorator", json!({"path": "m.py", "target_name": "run", "decorator": "cached"})).is_success());
        assert_eq!(read(&temp, "m.py"), "import os\nimport sys\n\n@cached\ndef run():\n    pass\n");
    }

    #[test]
    fn edit_refuses_file_that_is_not_utf8() {
        let temp = tempfile::tempdir().expect("tempdir");
        let original = b"caf\xe9\nhello\n";
        fs::write(temp.path().join("latin1.txt"), original).expect("write");
        let sup = ActionSupervisor::new(temp.path(), EngineConfig::default()).expect("supervisor");
        let result = run(
            &sup,
            "ReplaceText",
            json!({"path": "latin1.txt", "old_text": "hello", "new_text": "bye"}),
        );
        assert_eq!(result.status, ActionStatus::Failure);
        assert!(result.error.as_deref().unwrap_or_default().contains("not valid UTF-8"));
        assert_eq!(fs::read(temp.path().join("latin1.txt")).expect("read"), original);
    }
}
