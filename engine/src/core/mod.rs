//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. Every editing operation is a
//! `&str -> Result<EditOutcome, EditError>` transform, so a failing edit can
//! never leave a half-written file behind.

pub mod action;
pub mod edit;
pub mod keys;
pub mod lines;
pub mod pattern;
pub mod sanitize;
pub mod similarity;
pub mod structure;
