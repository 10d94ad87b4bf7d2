//! Sandboxed action engine.
//!
//! Applies structured file, text, git and shell actions inside one sandbox
//! root. Every mutating action runs under a transaction that backs up what it
//! touches and rolls back on failure. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (action model, text edits, pattern
//!   and fuzzy matching). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (path policy, transactions,
//!   filesystem, git and process execution, configuration).
//!
//! [`supervisor`] ties both together behind [`ActionSupervisor::dispatch`].

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use supervisor::ActionSupervisor;
