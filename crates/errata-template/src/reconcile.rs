//! Respin reconciliation: decide, for each resolved issue, whether to create a
//! new Jira issue, reuse an existing one, or leave it alone, and which issues
//! from earlier respins to close.
//!
//! Nothing here talks to Jira. The caller supplies what already exists and
//! carries out the returned actions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use errata_core::enums::{OnRespin, TransitionCategory};
use errata_core::erratum::Erratum;

use crate::error::ReconcileError;
use crate::types::{ResolvedIssue, Transitions};

/// A previously created Jira issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingIssue {
    /// Jira key, e.g. `RHELWF-1234`.
    pub key: String,
    /// Instance key of the resolved issue it was created for.
    pub instance: String,
    /// Respin the issue was created for.
    #[serde(default)]
    pub respin_count: u32,
    #[serde(default)]
    pub closed: bool,
}

/// What to do for one resolved issue or one obsolete existing issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IssueAction {
    Create {
        instance: String,
    },
    Reuse {
        instance: String,
        issue: String,
    },
    /// Every current issue was closed by a user; nothing left to do.
    AlreadyClosed {
        instance: String,
        issues: Vec<String>,
    },
    /// An ancestor is already closed.
    Skip {
        instance: String,
        ancestor: String,
    },
    Close {
        issue: String,
        transition: String,
        obsoleted_by: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Ignore closed issues and create new ones in their place.
    pub recreate: bool,
}

/// Compute the reconciliation plan for a respin.
pub fn plan(
    resolved: &[ResolvedIssue],
    existing: &[ExistingIssue],
    transitions: &Transitions,
    erratum: &Erratum,
    options: ReconcileOptions,
) -> Result<Vec<IssueAction>, ReconcileError> {
    let mut actions = Vec::new();
    let mut created: HashSet<&str> = HashSet::new();
    let mut skipped: HashSet<&str> = HashSet::new();

    for issue in resolved {
        let instance = issue.key.as_str();
        let parent = issue.parent.as_deref();

        if let Some(p) = parent.filter(|p| skipped.contains(p)) {
            actions.push(IssueAction::Skip {
                instance: instance.to_string(),
                ancestor: p.to_string(),
            });
            skipped.insert(instance);
            continue;
        }

        let parent_created = parent.is_some_and(|p| created.contains(p));
        let related = existing
            .iter()
            .filter(|e| e.instance == instance)
            .filter(|e| !(options.recreate && e.closed));

        let mut current: Vec<&ExistingIssue> = Vec::new();
        let mut old: Vec<&ExistingIssue> = Vec::new();
        for e in related {
            if e.respin_count == erratum.respin_count && !parent_created {
                current.push(e);
            } else if !e.closed {
                old.push(e);
            }
        }

        if issue.on_respin == OnRespin::Keep {
            current.append(&mut old);
        }

        if !options.recreate && !current.is_empty() {
            if current.iter().all(|e| e.closed) {
                debug!(instance, "relevant issues already closed");
                actions.push(IssueAction::AlreadyClosed {
                    instance: instance.to_string(),
                    issues: current.iter().map(|e| e.key.clone()).collect(),
                });
                skipped.insert(instance);
                continue;
            }
            current.retain(|e| !e.closed);
        }

        match current.as_slice() {
            [] => {
                actions.push(IssueAction::Create {
                    instance: instance.to_string(),
                });
                created.insert(instance);
            }
            [only] => actions.push(IssueAction::Reuse {
                instance: instance.to_string(),
                issue: only.key.clone(),
            }),
            many => {
                return Err(ReconcileError::DuplicateIssues {
                    instance: instance.to_string(),
                    issues: many.iter().map(|e| e.key.clone()).collect(),
                });
            }
        }

        if !old.is_empty() {
            let transition = transitions
                .target(TransitionCategory::Closed)
                .ok_or(ReconcileError::MissingTransition(TransitionCategory::Closed))?;
            for e in old {
                actions.push(IssueAction::Close {
                    issue: e.key.clone(),
                    transition: transition.to_string(),
                    obsoleted_by: instance.to_string(),
                });
            }
        }
    }
    Ok(actions)
}

/// Where a job stands, for automatic status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Started,
    Completed,
}

/// Status an issue should move to when its job reaches `progress`, if any.
pub fn auto_transition_target<'a>(
    issue: &ResolvedIssue,
    transitions: &'a Transitions,
    progress: Progress,
) -> Option<&'a str> {
    if !issue.auto_transition {
        return None;
    }
    let category = match progress {
        Progress::Started => TransitionCategory::Processed,
        Progress::Completed => TransitionCategory::Passed,
    };
    transitions.target(category)
}
