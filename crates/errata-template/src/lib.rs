//! Issue-template engine for errata-jira.
//!
//! An issue config is a YAML (or JSON/TOML) document describing the Jira
//! issues to file when an erratum is tested. This crate loads those documents
//! ([`parser`]), checks their structure ([`validate`]), renders the small
//! expression language embedded in them ([`expr`], [`render`]), expands
//! templates into concrete issues ([`engine`]) and plans what to do with
//! issues from earlier respins ([`reconcile`]).

pub mod engine;
pub mod error;
pub mod expr;
pub mod parser;
pub mod reconcile;
pub mod render;
pub mod types;
pub mod validate;

pub use engine::{condition_with, expand, render_with};
pub use error::{ExpandError, ExpressionError, ExprErrorKind, ReconcileError};
pub use parser::{find_spec, load_spec};
pub use reconcile::{ExistingIssue, IssueAction, Progress, ReconcileOptions, auto_transition_target, plan};
pub use types::{AssigneeOverride, Environment, ExpandContext, ResolvedIssue, WorkflowSpec};
