//! Action data model: the request, its closed set of kinds, and the result.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

macro_rules! action_kinds {
    ($($variant:ident => $tag:literal),+ $(,)?) => {
        /// Every operation the engine knows how to perform.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ActionKind {
            $($variant),+
        }

        impl ActionKind {
            pub const ALL: &'static [ActionKind] = &[$(ActionKind::$variant),+];

            /// Wire tag used in the `type` field.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ActionKind::$variant => $tag),+
                }
            }
        }

        impl FromStr for ActionKind {
            type Err = UnknownActionType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($tag => Ok(ActionKind::$variant),)+
                    other => Err(UnknownActionType(other.to_string())),
                }
            }
        }
    };
}

action_kinds! {
    CreateFile => "CreateFile",
    EditFile => "EditFile",
    ReadFile => "ReadFile",
    DeleteFile => "DeleteFile",
    MoveFile => "MoveFile",
    CopyFile => "CopyFile",
    RenameFile => "RenameFile",
    CreateFolder => "CreateFolder",
    DeleteFolder => "DeleteFolder",
    MoveFolder => "MoveFolder",
    CopyFolder => "CopyFolder",
    AppendText => "AppendText",
    PrependText => "PrependText",
    ReplaceText => "ReplaceText",
    InsertBeforeLine => "InsertBeforeLine",
    InsertAfterLine => "InsertAfterLine",
    DeleteLineRange => "DeleteLineRange",
    RewriteEntireFile => "RewriteEntireFile",
    ApplyPatch => "ApplyPatch",
    ReplaceByPattern => "ReplaceByPattern",
    DeleteByPattern => "DeleteByPattern",
    ReplaceByFuzzyMatch => "ReplaceByFuzzyMatch",
    InsertAtTop => "InsertAtTop",
    InsertAtBottom => "InsertAtBottom",
    InsertBlockAtLine => "InsertBlockAtLine",
    ReplaceBlock => "ReplaceBlock",
    RemoveBlock => "RemoveBlock",
    UpdateJsonKey => "UpdateJSONKey",
    UpdateYamlKey => "UpdateYAMLKey",
    InsertIntoFunction => "InsertIntoFunction",
    InsertIntoClass => "InsertIntoClass",
    AddDecorator => "AddDecorator",
    AddImport => "AddImport",
    RunGitCommand => "RunGitCommand",
    GitInit => "GitInit",
    GitAdd => "GitAdd",
    GitCommit => "GitCommit",
    GitPush => "GitPush",
    GitPull => "GitPull",
    GitBranch => "GitBranch",
    GitCheckout => "GitCheckout",
    GitMerge => "GitMerge",
    GitRemote => "GitRemote",
    SearchFiles => "SearchFiles",
    FindReplace => "FindReplace",
    GenerateProjectStructure => "GenerateProjectStructure",
    ScaffoldModule => "ScaffoldModule",
    RunShellCommand => "RunShellCommand",
    RunTests => "RunTests",
    BuildProject => "BuildProject",
    BatchOperation => "BatchOperation",
    AtomicOperation => "AtomicOperation",
    GitHubCreateRepo => "GitHubCreateRepo",
    GitHubDeleteRepo => "GitHubDeleteRepo",
    GitHubPushPath => "GitHubPushPath",
    GitHubCreateIssue => "GitHubCreateIssue",
    GitHubCreatePr => "GitHubCreatePR",
}

impl ActionKind {
    /// Kinds whose target path is anchored to the current view rather than
    /// resolved against existing files.
    pub fn creates_new_path(self) -> bool {
        matches!(self, Self::CreateFile | Self::CreateFolder | Self::ScaffoldModule)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionType(pub String);

/// A single requested operation. The `type` tag is parsed at dispatch time so
/// unknown tags surface as a failed result instead of a decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Action {
    /// Build an action; a non-object `params` value yields empty params.
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub fn params(&self) -> Params<'_> {
        Params(&self.params)
    }
}

/// Per-dispatch options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionContext {
    pub dry_run: bool,
    pub metadata: Map<String, Value>,
}

impl ActionContext {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failure,
    Partial,
    Skipped,
    DryRun,
}

/// The only channel through which an action reports its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_files: Vec<PathBuf>,
}

impl ActionResult {
    fn with_status(status: ActionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            error: None,
            sub_results: Vec::new(),
            modified_files: Vec::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Success, message)
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::with_status(ActionStatus::Failure, message);
        result.error = Some(error.into());
        result
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Partial, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Skipped, message)
    }

    pub fn dry_run(message: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::DryRun, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_modified(mut self, path: impl Into<PathBuf>) -> Self {
        self.modified_files.push(path.into());
        self
    }

    pub fn with_sub_results(mut self, sub_results: Vec<ActionResult>) -> Self {
        self.sub_results = sub_results;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == ActionStatus::Failure
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("missing parameter: {0}")]
    Missing(String),
    #[error("invalid parameter '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Read-only view over an action's parameters.
///
/// Every getter takes a list of accepted aliases; the first present key wins.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a>(pub &'a Map<String, Value>);

impl<'a> Params<'a> {
    pub fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    /// String value; numbers and booleans are stringified.
    pub fn str(&self, keys: &[&str]) -> Option<String> {
        match self.value(keys)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Non-blank string, trimmed.
    pub fn require_str(&self, keys: &[&str]) -> Result<String, ParamError> {
        self.str(keys)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParamError::Missing(keys.join("|")))
    }

    /// String used verbatim (may be empty); missing keys default to `""`.
    pub fn text(&self, keys: &[&str]) -> String {
        self.str(keys).unwrap_or_default()
    }

    pub fn usize(&self, keys: &[&str]) -> Result<Option<usize>, ParamError> {
        let Some(value) = self.value(keys) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| ParamError::Invalid {
            name: keys.join("|"),
            reason: format!("expected a non-negative integer, got {value}"),
        })
    }

    pub fn require_usize(&self, keys: &[&str]) -> Result<usize, ParamError> {
        self.usize(keys)?
            .ok_or_else(|| ParamError::Missing(keys.join("|")))
    }

    pub fn f64(&self, keys: &[&str]) -> Result<Option<f64>, ParamError> {
        let Some(value) = self.value(keys) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| ParamError::Invalid {
            name: keys.join("|"),
            reason: format!("expected a number, got {value}"),
        })
    }

    pub fn bool(&self, keys: &[&str], default: bool) -> bool {
        match self.value(keys) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => default,
        }
    }

    /// A list of strings; a single string becomes a one-element list.
    pub fn strings(&self, keys: &[&str]) -> Option<Vec<String>> {
        match self.value(keys)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Nested actions (for Batch / Atomic).
    pub fn actions(&self, keys: &[&str]) -> Result<Vec<Action>, ParamError> {
        let value = self
            .value(keys)
            .ok_or_else(|| ParamError::Missing(keys.join("|")))?;
        serde_json::from_value(value.clone()).map_err(|err| ParamError::Invalid {
            name: keys.join("|"),
            reason: err.to_string(),
        })
    }
}
