//! Stable exit codes for the `engine` CLI.

/// The action (or every action in a plan) succeeded, or was a dry run.
pub const OK: i32 = 0;
/// The action returned a failed result, or a path was refused.
pub const FAILED: i32 = 1;
/// A batch finished with both successes and failures.
pub const PARTIAL: i32 = 2;
/// Bad input or setup: unreadable action JSON, invalid config, missing root.
pub const INVALID: i32 = 3;
