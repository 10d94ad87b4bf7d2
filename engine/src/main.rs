//! Sandboxed action engine CLI.
//!
//! Reads actions as JSON (`{"type": "CreateFile", "params": {...}}`), applies
//! them inside `--root` and prints each `ActionResult` as pretty JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use engine::core::action::{Action, ActionContext, ActionResult, ActionStatus};
use engine::io::config::{EngineConfig, config_path, load_config};
use engine::{ActionSupervisor, exit_codes, logging};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Parser)]
#[command(
    name = "engine",
    version,
    about = "Apply file, text and git actions inside a sandbox root"
)]
struct Cli {
    /// Sandbox root. Nothing outside it is ever touched.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Initial current view, relative to the root.
    #[arg(long, global = true)]
    cwd: Option<String>,
    /// Config file (defaults to `<root>/.engine/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Report what would run without touching the disk.
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one action given inline as JSON or as `@path/to/action.json`.
    Dispatch { action: String },
    /// Run a list of actions (`[...]` or `{"actions": [...]}`) from `@file`.
    Plan {
        plan: String,
        /// Share one transaction and roll everything back on the first failure.
        #[arg(long)]
        atomic: bool,
    },
    /// Show how a path resolves against the sandbox policy.
    CheckPath { path: String },
    /// Print the git state of the current view.
    RepoState,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let supervisor = supervisor(&cli)?;
    let ctx = ActionContext {
        dry_run: cli.dry_run,
        ..ActionContext::default()
    };
    match cli.command {
        Command::Dispatch { action } => {
            let action: Action = serde_json::from_value(read_json_arg(&action)?).context("parse action")?;
            report(&supervisor.dispatch(&action, &ctx))
        }
        Command::Plan { plan, atomic } => {
            let actions = plan_actions(read_json_arg(&plan)?)?;
            report(&supervisor.dispatch_batch(&actions, atomic, &ctx))
        }
        Command::CheckPath { path } => cmd_check_path(&supervisor, &path),
        Command::RepoState => {
            print_json(&supervisor.git_repo_state()?)?;
            Ok(exit_codes::OK)
        }
    }
}

fn supervisor(cli: &Cli) -> Result<ActionSupervisor> {
    let config_file = cli.config.clone().unwrap_or_else(|| config_path(&cli.root));
    let config: EngineConfig = load_config(&config_file)?;
    let supervisor = ActionSupervisor::new(&cli.root, config)
        .with_context(|| format!("open sandbox {}", cli.root.display()))?;
    if let Some(cwd) = cli.cwd.as_deref() {
        supervisor
            .change_directory(cwd)
            .with_context(|| format!("change directory to {cwd}"))?;
    }
    Ok(supervisor)
}

/// Inline JSON, or the contents of the file named after a leading `@`.
fn read_json_arg(arg: &str) -> Result<Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(Path::new(path)).with_context(|| format!("read {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).context("parse json")
}

fn plan_actions(value: Value) -> Result<Vec<Action>> {
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove("actions") {
            Some(actions) => actions,
            None => bail!("plan object must contain an `actions` array"),
        },
        _ => bail!("plan must be an array of actions"),
    };
    serde_json::from_value(list).context("parse plan actions")
}

fn cmd_check_path(supervisor: &ActionSupervisor, path: &str) -> Result<i32> {
    match supervisor.policy().validate_path(Path::new(path)) {
        Ok(resolved) => {
            print_json(&json!({ "path": path, "allowed": true, "resolved": resolved }))?;
            Ok(exit_codes::OK)
        }
        Err(violation) => {
            print_json(&json!({ "path": path, "allowed": false, "reason": violation.to_string() }))?;
            Ok(exit_codes::FAILED)
        }
    }
}

fn report(result: &ActionResult) -> Result<i32> {
    print_json(result)?;
    Ok(exit_code(result.status))
}

fn exit_code(status: ActionStatus) -> i32 {
    match status {
        ActionStatus::Success | ActionStatus::Skipped | ActionStatus::DryRun => exit_codes::OK,
        ActionStatus::Partial => exit_codes::PARTIAL,
        ActionStatus::Failure => exit_codes::FAILED,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
