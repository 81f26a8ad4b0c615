//! Terminal UI helpers for `ej`.
//!
//! Provides Ayu-themed color styling and terminal detection for human-readable
//! output. Everything degrades to plain text when color is unavailable.

pub mod styles;
pub mod terminal;
