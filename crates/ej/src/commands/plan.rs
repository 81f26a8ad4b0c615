//! `ej plan` -- reconcile an expansion against previously created issues.
//!
//! The existing-issues file is a YAML (or JSON) list of
//! `{key, instance, respin_count, closed}` records, as recorded when the
//! issues were filed.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use errata_template::types::Transitions;
use errata_template::{
    ExistingIssue, IssueAction, Progress, ReconcileOptions, ResolvedIssue, auto_transition_target,
    expand, load_spec, plan,
};
use errata_ui::styles::{render_muted, render_skip_icon};

use crate::cli::PlanArgs;
use crate::context::RuntimeContext;
use crate::output::{output_json, output_table};

/// Execute the `ej plan` command.
pub fn run(ctx: &RuntimeContext, args: &PlanArgs) -> Result<()> {
    let path = ctx.resolve_issue_config(args.config.as_deref())?;
    let spec = load_spec(&path).with_context(|| format!("failed to load {}", path.display()))?;
    let expand_ctx = ctx.expand_context(&args.context)?;
    let issues = expand(&spec, &expand_ctx)
        .with_context(|| format!("failed to expand {}", path.display()))?;
    let existing = load_existing(&args.existing)?;

    let options = ReconcileOptions {
        recreate: args.recreate,
    };
    let actions = plan(&issues, &existing, &spec.transitions, &expand_ctx.erratum, options)?;

    if ctx.json {
        output_json(&serde_json::json!({
            "erratum": expand_ctx.erratum.id,
            "respin_count": expand_ctx.erratum.respin_count,
            "actions": actions,
        }));
        return Ok(());
    }

    if actions.is_empty() {
        if !ctx.quiet {
            println!("{} {}", render_skip_icon(), render_muted("nothing to do"));
        }
        return Ok(());
    }

    let by_key: HashMap<&str, &ResolvedIssue> = issues.iter().map(|i| (i.key.as_str(), i)).collect();
    let rows: Vec<Vec<String>> = actions
        .iter()
        .map(|action| action_row(action, &by_key, &spec.transitions))
        .collect();
    output_table(&["ACTION", "INSTANCE", "ISSUE", "DETAIL"], &rows);
    Ok(())
}

/// Read the existing-issues list. An empty file means nothing exists yet.
fn load_existing(path: &Path) -> Result<Vec<ExistingIssue>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn action_row(
    action: &IssueAction,
    resolved: &HashMap<&str, &ResolvedIssue>,
    transitions: &Transitions,
) -> Vec<String> {
    let auto = |instance: &str| {
        resolved
            .get(instance)
            .and_then(|issue| {
                let started = auto_transition_target(issue, transitions, Progress::Started)?;
                let completed = auto_transition_target(issue, transitions, Progress::Completed)?;
                Some(format!("auto: {} -> {}", started, completed))
            })
            .unwrap_or_default()
    };

    match action {
        IssueAction::Create { instance } => {
            vec!["create".into(), instance.clone(), String::new(), auto(instance)]
        }
        IssueAction::Reuse { instance, issue } => {
            vec!["reuse".into(), instance.clone(), issue.clone(), auto(instance)]
        }
        IssueAction::AlreadyClosed { instance, issues } => vec![
            "closed".into(),
            instance.clone(),
            issues.join(", "),
            "closed by a user".into(),
        ],
        IssueAction::Skip { instance, ancestor } => vec![
            "skip".into(),
            instance.clone(),
            String::new(),
            format!("ancestor {} is closed", ancestor),
        ],
        IssueAction::Close {
            issue,
            transition,
            obsoleted_by,
        } => vec![
            "close".into(),
            obsoleted_by.clone(),
            issue.clone(),
            format!("-> {}", transition),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_existing_file_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.yaml");
        std::fs::write(&path, "\n").unwrap();
        assert!(load_existing(&path).unwrap().is_empty());
    }

    #[test]
    fn existing_issues_parse_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.json");
        std::fs::write(&path, r#"[{"key": "RHELWF-1", "instance": "epic"}]"#).unwrap();
        assert_eq!(
            load_existing(&path).unwrap(),
            vec![ExistingIssue {
                key: "RHELWF-1".into(),
                instance: "epic".into(),
                respin_count: 0,
                closed: false,
            }]
        );
    }

    #[test]
    fn close_row_names_transition() {
        let action = IssueAction::Close {
            issue: "RHELWF-2".into(),
            transition: "Closed".into(),
            obsoleted_by: "epic/task".into(),
        };
        let row = action_row(&action, &HashMap::new(), &Transitions::default());
        assert_eq!(row, vec!["close", "epic/task", "RHELWF-2", "-> Closed"]);
    }
}
