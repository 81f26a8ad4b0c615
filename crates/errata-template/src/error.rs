//! Errors raised while loading, validating, expanding and reconciling.

use errata_core::enums::TransitionCategory;

/// What went wrong inside a single expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprErrorKind {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
}

/// An expression failure, carrying the template string it occurred in.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} in template {template:?}")]
pub struct ExpressionError {
    pub template: String,
    pub kind: ExprErrorKind,
}

impl ExpressionError {
    pub fn new(template: &str, kind: ExprErrorKind) -> Self {
        Self {
            template: template.to_string(),
            kind,
        }
    }

    /// Name of the missing variable, if that is what failed.
    pub fn missing_variable(&self) -> Option<&str> {
        match self.kind {
            ExprErrorKind::UndefinedVariable(ref name) => Some(name),
            _ => None,
        }
    }
}

/// Errors that can occur while loading and expanding an issue config.
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("issue config '{0}' not found")]
    NotFound(String),

    #[error("include cycle: {}", chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    #[error("project is required")]
    MissingProject,

    #[error("invalid issue id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("duplicate issue id: {0}")]
    DuplicateId(String),

    #[error("more than one issue expands to instance '{0}'")]
    DuplicateInstance(String),

    #[error("issue '{issue}' references unknown parent_id '{parent_id}'")]
    UnresolvedReference { issue: String, parent_id: String },

    #[error("cyclic parentage: {}", path.join(" -> "))]
    CyclicParentage { path: Vec<String> },

    #[error("invalid hierarchy for issue '{issue}': {reason}")]
    InvalidHierarchy { issue: String, reason: String },

    #[error("failed to render issue '{issue}'")]
    Expression {
        issue: String,
        #[source]
        source: ExpressionError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while planning a respin.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("more than one current issue found for '{instance}': {}", issues.join(", "))]
    DuplicateIssues {
        instance: String,
        issues: Vec<String>,
    },

    #[error("no '{0}' transition configured")]
    MissingTransition(TransitionCategory),
}
