//! Structural validation, creation order and lints for issue-config documents.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use errata_core::enums::OnRespin;
use serde::Serialize;

use crate::error::{ExpandError, ExpressionError};
use crate::render::Template;
use crate::types::{IssueTemplate, WorkflowSpec};

/// Check a document for structural errors.
///
/// Checks run in a fixed order so the first reported error is stable:
/// missing project, malformed ids, duplicate ids, unresolved parents, cycles,
/// hierarchy, and finally template syntax.
pub fn validate(spec: &WorkflowSpec) -> Result<(), ExpandError> {
    if spec.project.trim().is_empty() {
        return Err(ExpandError::MissingProject);
    }

    let mut by_id: HashMap<&str, &IssueTemplate> = HashMap::new();
    for template in &spec.issues {
        if let Some(ref id) = template.id {
            check_id(id)?;
            if by_id.insert(id.as_str(), template).is_some() {
                return Err(ExpandError::DuplicateId(id.clone()));
            }
        }
    }

    for (index, template) in spec.issues.iter().enumerate() {
        if let Some(ref parent_id) = template.parent_id {
            if !by_id.contains_key(parent_id.as_str()) {
                return Err(ExpandError::UnresolvedReference {
                    issue: template.key(index),
                    parent_id: parent_id.clone(),
                });
            }
        }
    }

    check_cycles(spec, &by_id)?;

    for (index, template) in spec.issues.iter().enumerate() {
        check_hierarchy(template, index, &by_id)?;
    }

    check_syntax(spec)
}

/// Ids become instance keys, so they must not look like the keys generated
/// for id-less templates (`issue-N`) or contain key separators.
fn check_id(id: &str) -> Result<(), ExpandError> {
    let invalid = |reason: &str| ExpandError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id.contains(['/', '#']) {
        return Err(invalid("must not contain '/' or '#'"));
    }
    let generated = id
        .strip_prefix("issue-")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    if generated {
        return Err(invalid("'issue-N' is reserved for templates without an id"));
    }
    Ok(())
}

fn check_cycles(spec: &WorkflowSpec, by_id: &HashMap<&str, &IssueTemplate>) -> Result<(), ExpandError> {
    for template in &spec.issues {
        let Some(ref start) = template.id else {
            continue;
        };
        let mut path = vec![start.clone()];
        let mut current = template.parent_id.as_deref();
        while let Some(parent) = current {
            if let Some(pos) = path.iter().position(|p| p == parent) {
                let mut cycle = path.split_off(pos);
                cycle.push(parent.to_string());
                // Report the cycle in parent -> child direction.
                cycle.reverse();
                return Err(ExpandError::CyclicParentage { path: cycle });
            }
            path.push(parent.to_string());
            current = by_id.get(parent).and_then(|t| t.parent_id.as_deref());
        }
    }
    Ok(())
}

fn check_hierarchy(
    template: &IssueTemplate,
    index: usize,
    by_id: &HashMap<&str, &IssueTemplate>,
) -> Result<(), ExpandError> {
    let invalid = |reason: String| ExpandError::InvalidHierarchy {
        issue: template.key(index),
        reason,
    };
    let parent = template
        .parent_id
        .as_deref()
        .and_then(|id| by_id.get(id).copied());
    match parent {
        None if template.issue_type.requires_parent() => Err(invalid(format!(
            "{} requires a parent",
            template.issue_type
        ))),
        None => Ok(()),
        Some(parent) if !parent.issue_type.can_parent(template.issue_type) => {
            Err(invalid(format!(
                "{} cannot be a child of {}",
                template.issue_type, parent.issue_type
            )))
        }
        Some(_) => Ok(()),
    }
}

/// Every template string a template carries.
fn template_strings(template: &IssueTemplate) -> Vec<&str> {
    let mut out = vec![template.summary.as_str(), template.description.as_str()];
    if let Some(ref assignee) = template.assignee {
        out.push(assignee);
    }
    for value in template.fields.values() {
        collect_string_leaves(value, &mut out);
    }
    out
}

fn collect_string_leaves<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
    match value {
        serde_json::Value::String(s) => out.push(s),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_string_leaves(item, out);
            }
        }
        _ => {}
    }
}

fn check_syntax(spec: &WorkflowSpec) -> Result<(), ExpandError> {
    let compile = |issue: String, src: &str| {
        Template::compile(src).map(|_| ()).map_err(|kind| ExpandError::Expression {
            issue,
            source: ExpressionError::new(src, kind),
        })
    };
    if let Some(ref assignee) = spec.defaults.assignee {
        compile("defaults".into(), assignee)?;
    }
    let mut default_leaves = Vec::new();
    for value in spec.defaults.fields.values() {
        collect_string_leaves(value, &mut default_leaves);
    }
    for src in default_leaves {
        compile("defaults".into(), src)?;
    }
    for (index, template) in spec.issues.iter().enumerate() {
        for src in template_strings(template) {
            compile(template.key(index), src)?;
        }
        if let Some(ref when) = template.when {
            crate::expr::parse(strip_delimiters(when)).map_err(|kind| ExpandError::Expression {
                issue: template.key(index),
                source: ExpressionError::new(when, kind),
            })?;
        }
    }
    Ok(())
}

fn strip_delimiters(src: &str) -> &str {
    let trimmed = src.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed)
}

/// Template indices in creation order: document order, with a template whose
/// parent has not been placed yet deferred to the back of the queue.
pub fn creation_order(spec: &WorkflowSpec) -> Result<Vec<usize>, ExpandError> {
    let mut queue: VecDeque<usize> = (0..spec.issues.len()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(spec.issues.len());
    let mut deferred_in_a_row = 0;

    while let Some(index) = queue.pop_front() {
        let template = &spec.issues[index];
        let ready = match template.parent_id {
            Some(ref parent) => placed.contains(parent.as_str()),
            None => true,
        };
        if ready {
            order.push(index);
            if let Some(ref id) = template.id {
                placed.insert(id);
            }
            deferred_in_a_row = 0;
        } else {
            queue.push_back(index);
            deferred_in_a_row += 1;
            if deferred_in_a_row > queue.len() {
                let path = queue.iter().map(|i| spec.issues[*i].key(*i)).collect();
                return Err(ExpandError::CyclicParentage { path });
            }
        }
    }
    Ok(order)
}

// ---------------------------------------------------------------------------
// Lints
// ---------------------------------------------------------------------------

/// A non-fatal finding about a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lint {
    /// Template key, or none for document-wide findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    pub message: String,
}

impl fmt::Display for Lint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issue {
            Some(ref issue) => write!(f, "{}: {}", issue, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Collect warnings for a structurally valid document.
pub fn lint(spec: &WorkflowSpec) -> Vec<Lint> {
    let mut lints = Vec::new();
    let doc = |message: String| Lint {
        issue: None,
        message,
    };

    if spec.issues.iter().any(|t| t.on_respin == OnRespin::Close) && spec.transitions.closed.is_empty() {
        lints.push(doc(
            "templates close issues on respin but transitions.closed is empty".into(),
        ));
    }
    if spec.issues.iter().any(|t| t.auto_transition)
        && (spec.transitions.processed.is_empty() || spec.transitions.passed.is_empty())
    {
        lints.push(doc(
            "templates use auto_transition but transitions.processed or transitions.passed is empty"
                .into(),
        ));
    }

    for (index, template) in spec.issues.iter().enumerate() {
        let at = |message: String| Lint {
            issue: Some(template.key(index)),
            message,
        };
        if matches!(template.iterate, Some(ref entries) if entries.is_empty()) {
            lints.push(at("iterate is empty and produces a single instance".into()));
        }
        if let Some(ref recipe) = template.job_recipe {
            if !(recipe.starts_with("https://") || recipe.starts_with("http://")) {
                lints.push(at(format!("job_recipe '{}' is not an http(s) URL", recipe)));
            }
        }
        for name in false_valued_variables(template) {
            lints.push(at(format!(
                "ENVIRONMENT.{} is 'false', a non-empty string that conditions treat as true; \
                 compare explicitly (== 'true')",
                name
            )));
        }
        for name in runtime_only_variables(spec, template) {
            lints.push(at(format!(
                "ENVIRONMENT.{} is not set by the document and must be supplied at runtime",
                name
            )));
        }
    }
    lints
}

/// Variables a template binds to `false`, which become the string `"false"`.
fn false_valued_variables(template: &IssueTemplate) -> BTreeSet<String> {
    let entries = std::iter::once(&template.environment).chain(template.iterate.iter().flatten());
    entries
        .flat_map(|env| env.iter())
        .filter(|(_, value)| value.eq_ignore_ascii_case("false"))
        .map(|(key, _)| key.clone())
        .collect()
}

/// `ENVIRONMENT` variables a template references that no layer of the
/// document defines for it.
///
/// The `defaults` strings a template falls back to are scanned too.
fn runtime_only_variables(spec: &WorkflowSpec, template: &IssueTemplate) -> BTreeSet<String> {
    let mut sources = template_strings(template);
    if template.assignee.is_none() {
        if let Some(ref assignee) = spec.defaults.assignee {
            sources.push(assignee);
        }
    }
    for (key, value) in &spec.defaults.fields {
        if !template.fields.contains_key(key) {
            collect_string_leaves(value, &mut sources);
        }
    }

    let mut referenced = BTreeSet::new();
    for src in sources {
        if let Ok(t) = Template::compile(src) {
            referenced.extend(t.referenced_paths());
        }
    }
    if let Some(ref when) = template.when {
        if let Ok(e) = crate::expr::parse(strip_delimiters(when)) {
            e.collect_paths(&mut referenced);
        }
    }

    let mut defined: HashSet<&str> = template.environment.iter().map(|(k, _)| k.as_str()).collect();
    let mut current = Some(template);
    // Bounded walk up the ancestor chain.
    for _ in 0..=spec.issues.len() {
        let Some(t) = current else {
            break;
        };
        for entry in t.iterate.iter().flatten() {
            defined.extend(entry.iter().map(|(k, _)| k.as_str()));
        }
        current = t.parent_id.as_deref().and_then(|p| spec.template(p));
    }

    referenced
        .iter()
        .filter_map(|path| path.strip_prefix("ENVIRONMENT."))
        .map(|rest| rest.split(['.', '[']).next().unwrap_or(rest))
        .filter(|name| !defined.contains(name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_yaml;
    use pretty_assertions::assert_eq;

    fn spec(yaml: &str) -> WorkflowSpec {
        parse_yaml(yaml).unwrap()
    }

    const VALID: &str = r#"
project: P
transitions:
  closed: [Closed]
  processed: [In Progress]
  passed: [Done]
issues:
  - summary: Epic
    type: epic
    id: epic
    on_respin: keep
  - summary: "Sub {{ ENVIRONMENT.FOO }}"
    type: subtask
    parent_id: task
    iterate:
      - FOO: a
  - summary: Task
    type: task
    id: task
    parent_id: epic
"#;

    #[test]
    fn valid_document_passes() {
        validate(&spec(VALID)).unwrap();
    }

    #[test]
    fn missing_project() {
        let s = spec("issues: []\n");
        assert!(matches!(validate(&s), Err(ExpandError::MissingProject)));
    }

    #[test]
    fn duplicate_id() {
        let s = spec(
            "project: P\nissues:\n  - {summary: a, type: epic, id: x}\n  - {summary: b, type: epic, id: x}\n",
        );
        assert!(matches!(validate(&s), Err(ExpandError::DuplicateId(ref id)) if id == "x"));
    }

    #[test]
    fn unresolved_reference() {
        let s = spec(
            "project: P\nissues:\n  - {summary: a, type: epic, id: errata_task}\n  - {summary: b, type: task, parent_id: errata_task_typo}\n",
        );
        match validate(&s) {
            Err(ExpandError::UnresolvedReference { issue, parent_id }) => {
                assert_eq!(issue, "issue-2");
                assert_eq!(parent_id, "errata_task_typo");
            }
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn self_reference_is_cycle() {
        let s = spec("project: P\nissues:\n  - {summary: a, type: task, id: a, parent_id: a}\n");
        match validate(&s) {
            Err(ExpandError::CyclicParentage { path }) => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected CyclicParentage, got {:?}", other),
        }
    }

    #[test]
    fn longer_cycle_reports_path() {
        let s = spec(
            "project: P\nissues:\n  - {summary: a, type: task, id: a, parent_id: b}\n  - {summary: b, type: task, id: b, parent_id: a}\n",
        );
        let err = validate(&s).unwrap_err();
        assert_eq!(err.to_string(), "cyclic parentage: a -> b -> a");
    }

    #[test]
    fn hierarchy_rules() {
        let s = spec("project: P\nissues:\n  - {summary: s, type: subtask}\n");
        assert_eq!(
            validate(&s).unwrap_err().to_string(),
            "invalid hierarchy for issue 'issue-1': subtask requires a parent"
        );

        let s = spec(
            "project: P\nissues:\n  - {summary: e, type: epic, id: e}\n  - {summary: s, type: subtask, parent_id: e}\n",
        );
        assert_eq!(
            validate(&s).unwrap_err().to_string(),
            "invalid hierarchy for issue 'issue-2': subtask cannot be a child of epic"
        );

        let s = spec(
            "project: P\nissues:\n  - {summary: e, type: epic, id: e}\n  - {summary: f, type: epic, parent_id: e}\n",
        );
        assert!(matches!(validate(&s), Err(ExpandError::InvalidHierarchy { .. })));
    }

    #[test]
    fn malformed_template_detected_before_rendering() {
        let s = spec("project: P\nissues:\n  - {summary: 'Bad {{ ERRATUM.id', type: epic, id: e}\n");
        match validate(&s) {
            Err(ExpandError::Expression { issue, source }) => {
                assert_eq!(issue, "e");
                assert_eq!(source.template, "Bad {{ ERRATUM.id");
            }
            other => panic!("expected Expression, got {:?}", other),
        }
    }

    #[test]
    fn ids_that_mimic_generated_keys_are_rejected() {
        // An anonymous task is keyed issue-2; a declared issue-2 would share it.
        let s = spec(
            r#"
project: P
issues:
  - {summary: e, type: epic, id: e}
  - {summary: anon, type: task, parent_id: e}
  - {summary: named, type: task, id: issue-2, parent_id: e}
  - {summary: sub, type: subtask, parent_id: issue-2}
"#,
        );
        match validate(&s) {
            Err(ExpandError::InvalidId { id, reason }) => {
                assert_eq!(id, "issue-2");
                assert!(reason.contains("reserved"));
            }
            other => panic!("expected InvalidId, got {:?}", other),
        }

        for bad in ["'e/task'", "'task#0'", "''"] {
            let s = spec(&format!(
                "project: P\nissues:\n  - {{summary: a, type: epic, id: {}}}\n",
                bad
            ));
            assert!(
                matches!(validate(&s), Err(ExpandError::InvalidId { .. })),
                "id {} should be rejected",
                bad
            );
        }

        for good in ["issue", "issue-", "issue-2a", "my-issue-2"] {
            let s = spec(&format!(
                "project: P\nissues:\n  - {{summary: a, type: epic, id: {}}}\n",
                good
            ));
            validate(&s).unwrap();
        }
    }

    #[test]
    fn creation_order_defers_children() {
        let order = creation_order(&spec(VALID)).unwrap();
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn lints_report_configuration_gaps() {
        let s = spec(
            r#"
project: P
issues:
  - summary: "E {{ ENVIRONMENT.RUNTIME_ONLY }}"
    type: epic
    id: e
    auto_transition: true
    job_recipe: recipes/local.yaml
    iterate: []
  - summary: "T {{ ENVIRONMENT.FOO }} {{ ENVIRONMENT.BAR }}"
    type: task
    parent_id: e
    environment:
      BAR: x
"#,
        );
        let messages: Vec<String> = lint(&s).iter().map(|l| l.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "templates close issues on respin but transitions.closed is empty",
                "templates use auto_transition but transitions.processed or transitions.passed is empty",
                "e: iterate is empty and produces a single instance",
                "e: job_recipe 'recipes/local.yaml' is not an http(s) URL",
                "e: ENVIRONMENT.RUNTIME_ONLY is not set by the document and must be supplied at runtime",
                "issue-2: ENVIRONMENT.FOO is not set by the document and must be supplied at runtime",
            ]
        );
    }

    #[test]
    fn inherited_iterate_bindings_count_as_defined() {
        let s = spec(
            r#"
project: P
transitions:
  closed: [Closed]
issues:
  - summary: "T {{ ENVIRONMENT.FOO }}"
    type: task
    id: t
    iterate:
      - FOO: a
  - summary: "S {{ ENVIRONMENT.FOO }}"
    type: subtask
    parent_id: t
"#,
        );
        assert!(lint(&s).is_empty());
    }

    #[test]
    fn runtime_only_variables_in_defaults_are_reported() {
        let s = spec(
            r#"
project: P
transitions:
  closed: [Closed]
defaults:
  assignee: "{{ ENVIRONMENT.OWNER }}"
  fields:
    Pool Team: "{{ ENVIRONMENT.POOL }}"
    Labels: ["{{ ENVIRONMENT.LABEL }}"]
issues:
  - summary: Epic
    type: epic
    id: e
  - summary: Task
    type: task
    parent_id: e
    assignee: someone
    fields:
      Pool Team: fixed
    environment:
      LABEL: qe
"#,
        );
        let messages: Vec<String> = lint(&s).iter().map(|l| l.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "e: ENVIRONMENT.LABEL is not set by the document and must be supplied at runtime",
                "e: ENVIRONMENT.OWNER is not set by the document and must be supplied at runtime",
                "e: ENVIRONMENT.POOL is not set by the document and must be supplied at runtime",
            ]
        );
    }

    #[test]
    fn false_environment_values_are_flagged() {
        let s = spec(
            r#"
project: P
transitions:
  closed: [Closed]
issues:
  - summary: Epic
    type: epic
    id: e
    environment:
      ENABLED: false
      NAME: x
  - summary: "T {{ ENVIRONMENT.ARCH }}"
    type: task
    parent_id: e
    when: "{{ ENVIRONMENT.ARCH == 's390x' }}"
    iterate:
      - {ARCH: s390x, GATED: "False"}
      - {ARCH: x86_64, GATED: true}
"#,
        );
        let messages: Vec<String> = lint(&s).iter().map(|l| l.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "e: ENVIRONMENT.ENABLED is 'false', a non-empty string that conditions treat as true; compare explicitly (== 'true')",
                "issue-2: ENVIRONMENT.GATED is 'false', a non-empty string that conditions treat as true; compare explicitly (== 'true')",
            ]
        );
    }
}
