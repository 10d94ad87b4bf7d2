//! Side-effecting helpers: filesystem, git, subprocesses, configuration.

pub mod config;
pub mod fsops;
pub mod git;
pub mod process;
pub mod remote;
pub mod security;
pub mod transaction;
