//! Expand issue templates into resolved issues: iterate fan-out, environment
//! layering, rendering, `when` filtering and parent binding.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ExpandError, ExpressionError};
use crate::expr::Namespace;
use crate::render::{evaluate_condition, render};
use crate::types::{
    AssigneeOverride, Environment, ExpandContext, IssueTemplate, ResolvedIssue, ValueMap,
    WorkflowSpec,
};
use crate::validate::{creation_order, validate};

/// An expanded instance that children can bind to.
#[derive(Debug, Clone)]
struct ParentInstance {
    key: String,
    /// Iterate bindings along the ancestor chain, this instance's included.
    bindings: Environment,
}

/// Expand a document into resolved issues.
///
/// Structural problems are reported before anything is rendered. Output is in
/// creation order: parents always precede their children.
pub fn expand(spec: &WorkflowSpec, ctx: &ExpandContext) -> Result<Vec<ResolvedIssue>, ExpandError> {
    // 1. Structure first, so a bad reference produces zero issues
    validate(spec)?;
    let order = creation_order(spec)?;

    let erratum = ctx.erratum.to_value();
    let mut instances: HashMap<&str, Vec<ParentInstance>> = HashMap::new();
    let mut resolved = Vec::new();

    for index in order {
        let template = &spec.issues[index];
        let template_key = template.key(index);

        // 2. Parent instances to bind to; a parent with no surviving
        //    instances leaves nothing to attach to
        let parents: Vec<Option<&ParentInstance>> = match template.parent_id {
            Some(ref parent_id) => instances
                .get(parent_id.as_str())
                .map(|list| list.iter().map(Some).collect())
                .unwrap_or_default(),
            None => vec![None],
        };

        // 3. Cross-join parent instances with iterate entries
        let mut produced = Vec::new();
        for parent in parents {
            let inherited = parent.map(|p| p.bindings.clone()).unwrap_or_default();
            for (iteration, binding) in template.iterations() {
                let key = instance_key(parent, &template_key, iteration);
                let environment = template
                    .environment
                    .layered(&ctx.environment)
                    .layered(&inherited)
                    .layered(&binding);
                let ns = namespace(&erratum, &environment);

                if let Some(ref when) = template.when {
                    let keep = evaluate_condition(when, &ns).map_err(|e| expression(&key, e))?;
                    if !keep {
                        debug!(instance = %key, when = %when, "condition false, skipping instance");
                        continue;
                    }
                }

                let issue = resolve(spec, template, ctx, &ns, ResolvedParts {
                    key: key.clone(),
                    parent: parent.map(|p| p.key.clone()),
                    environment,
                    iteration,
                })?;
                debug!(instance = %issue.key, summary = %issue.summary, "expanded instance");
                resolved.push(issue);
                produced.push(ParentInstance {
                    key,
                    bindings: inherited.layered(&binding),
                });
            }
        }

        if let Some(ref id) = template.id {
            instances.insert(id.as_str(), produced);
        }
    }

    ensure_unique_keys(&resolved)?;
    info!(
        project = %spec.project,
        templates = spec.issues.len(),
        issues = resolved.len(),
        "expanded issue config"
    );
    Ok(resolved)
}

/// Every instance key must name exactly one issue; children and the respin
/// planner look instances up by key.
fn ensure_unique_keys(issues: &[ResolvedIssue]) -> Result<(), ExpandError> {
    let mut seen = HashSet::with_capacity(issues.len());
    for issue in issues {
        if !seen.insert(issue.key.as_str()) {
            return Err(ExpandError::DuplicateInstance(issue.key.clone()));
        }
    }
    Ok(())
}

/// Per-instance values computed before rendering.
struct ResolvedParts {
    key: String,
    parent: Option<String>,
    environment: Environment,
    iteration: Option<usize>,
}

fn resolve(
    spec: &WorkflowSpec,
    template: &IssueTemplate,
    ctx: &ExpandContext,
    ns: &Namespace,
    parts: ResolvedParts,
) -> Result<ResolvedIssue, ExpandError> {
    let key = parts.key;
    let wrap = |e: ExpressionError| expression(&key, e);

    let summary = render(&template.summary, ns).map_err(wrap)?;
    let description = render(&template.description, ns).map_err(wrap)?;

    let assignee = match ctx.assignee {
        AssigneeOverride::Fixed(ref user) => Some(user.clone()),
        AssigneeOverride::Unassigned => None,
        AssigneeOverride::Template => {
            match template.assignee.as_ref().or(spec.defaults.assignee.as_ref()) {
                Some(src) => {
                    let rendered = render(src, ns).map_err(wrap)?;
                    let rendered = rendered.trim();
                    (!rendered.is_empty()).then(|| rendered.to_string())
                }
                None => None,
            }
        }
    };

    // template ?? defaults, per field
    let mut fields: ValueMap = spec.defaults.fields.clone();
    fields.extend(template.fields.clone());
    let fields = fields
        .into_iter()
        .map(|(name, value)| render_value(value, ns).map(|v| (name, v)))
        .collect::<Result<ValueMap, ExpressionError>>()
        .map_err(wrap)?;

    Ok(ResolvedIssue {
        template_id: template.id.clone(),
        issue_type: template.issue_type,
        summary,
        description,
        assignee,
        fields,
        parent: parts.parent,
        on_respin: template.on_respin,
        auto_transition: template.auto_transition,
        job_recipe: template.job_recipe.clone(),
        environment: parts.environment,
        context: template.context.clone(),
        iteration: parts.iteration,
        key,
    })
}

/// Render every string leaf of a field value.
fn render_value(value: Value, ns: &Namespace) -> Result<Value, ExpressionError> {
    Ok(match value {
        Value::String(s) => Value::String(render(&s, ns)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| render_value(v, ns))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| render_value(v, ns).map(|v| (k, v)))
                .collect::<Result<_, _>>()?,
        ),
        other => other,
    })
}

fn instance_key(parent: Option<&ParentInstance>, template_key: &str, iteration: Option<usize>) -> String {
    let mut key = match parent {
        Some(p) => format!("{}/{}", p.key, template_key),
        None => template_key.to_string(),
    };
    if let Some(i) = iteration {
        key.push_str(&format!("#{}", i));
    }
    key
}

fn namespace(erratum: &Value, environment: &Environment) -> Namespace {
    let mut ns = Namespace::new();
    ns.insert("ERRATUM".into(), erratum.clone());
    ns.insert("ENVIRONMENT".into(), environment.to_value());
    ns
}

fn expression(key: &str, source: ExpressionError) -> ExpandError {
    ExpandError::Expression {
        issue: key.to_string(),
        source,
    }
}

/// Render a single template string against an erratum and environment.
pub fn render_with(src: &str, ctx: &ExpandContext) -> Result<String, ExpressionError> {
    render(src, &namespace(&ctx.erratum.to_value(), &ctx.environment))
}

/// Evaluate a `when`-style condition against an erratum and environment.
pub fn condition_with(src: &str, ctx: &ExpandContext) -> Result<bool, ExpressionError> {
    evaluate_condition(src, &namespace(&ctx.erratum.to_value(), &ctx.environment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_yaml;
    use errata_core::enums::{IssueType, OnRespin};
    use errata_core::erratum::ErratumBuilder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const ERRATA_YAML: &str = r#"
project: RHELWF
transitions:
  closed: [Closed]
  processed: [In Progress]
  passed: [Closed]
defaults:
  assignee: "{{ ERRATUM.people_assigned_to | default('') }}"
  fields:
    Pool Team: rhel-sst-tt
    Labels: ["errata", "ER#{{ ERRATUM.id }}"]
issues:
  - summary: "Testing ER#{{ ERRATUM.id }} \"{{ ERRATUM.summary }}\"{% if ERRATUM.respin_count > 0 %} (respin {{ ERRATUM.respin_count }}){% endif %}"
    description: "{{ ERRATUM.url }}"
    type: epic
    id: errata_epic
    on_respin: keep
  - summary: "Errata filelist check"
    description: "Task for ER#{{ ERRATUM.id }}"
    type: task
    id: errata_task
    parent_id: errata_epic
    on_respin: close
    auto_transition: True
    job_recipe: https://example.com/recipe.yaml
    context:
      tier: 1
  - summary: "Subtask {{ ENVIRONMENT.FOO }}"
    description: "{{ ENVIRONMENT.ISSUE_DESC }}"
    type: subtask
    parent_id: errata_task
    iterate:
      - FOO: bar
        ISSUE_DESC: non-default description
      - FOO: baz
    environment:
      ISSUE_DESC: default description
"#;

    fn ctx(respin: u32) -> ExpandContext {
        ExpandContext {
            erratum: ErratumBuilder::new("12345")
                .summary("bash bug fix update")
                .respin_count(respin)
                .people_assigned_to("tester@example.com")
                .url("https://errata.example.com/advisory/12345")
                .build(),
            ..ExpandContext::default()
        }
    }

    fn keys(issues: &[ResolvedIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.key.as_str()).collect()
    }

    #[test]
    fn expands_errata_workflow() {
        let spec = parse_yaml(ERRATA_YAML).unwrap();
        let issues = expand(&spec, &ctx(0)).unwrap();
        assert_eq!(
            keys(&issues),
            vec![
                "errata_epic",
                "errata_epic/errata_task",
                "errata_epic/errata_task/issue-3#0",
                "errata_epic/errata_task/issue-3#1",
            ]
        );

        let epic = &issues[0];
        assert_eq!(epic.issue_type, IssueType::Epic);
        assert_eq!(epic.summary, "Testing ER#12345 \"bash bug fix update\"");
        assert_eq!(epic.description, "https://errata.example.com/advisory/12345");
        assert_eq!(epic.on_respin, OnRespin::Keep);
        assert_eq!(epic.parent, None);
        assert_eq!(epic.assignee.as_deref(), Some("tester@example.com"));

        let task = &issues[1];
        assert_eq!(task.parent.as_deref(), Some("errata_epic"));
        assert!(task.auto_transition);
        assert_eq!(task.job_recipe.as_deref(), Some("https://example.com/recipe.yaml"));
        assert_eq!(task.context["tier"], 1);
        assert_eq!(task.fields["Pool Team"], "rhel-sst-tt");
        assert_eq!(task.fields["Labels"], json!(["errata", "ER#12345"]));
    }

    #[test]
    fn iterate_entry_overrides_template_environment() {
        let spec = parse_yaml(ERRATA_YAML).unwrap();
        let issues = expand(&spec, &ctx(0)).unwrap();
        let subtasks: Vec<&ResolvedIssue> = issues
            .iter()
            .filter(|i| i.issue_type == IssueType::Subtask)
            .collect();
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].summary, "Subtask bar");
        assert_eq!(subtasks[0].description, "non-default description");
        assert_eq!(subtasks[0].iteration, Some(0));
        assert_eq!(subtasks[1].summary, "Subtask baz");
        assert_eq!(subtasks[1].description, "default description");
        assert_eq!(subtasks[1].environment.get("FOO"), Some("baz"));
        assert_eq!(
            subtasks[1].parent.as_deref(),
            Some("errata_epic/errata_task")
        );
    }

    #[test]
    fn respin_suffix() {
        let spec = parse_yaml(ERRATA_YAML).unwrap();
        let first = expand(&spec, &ctx(0)).unwrap();
        assert!(!first[0].summary.contains("respin"));
        let respin = expand(&spec, &ctx(2)).unwrap();
        assert_eq!(
            respin[0].summary,
            "Testing ER#12345 \"bash bug fix update\" (respin 2)"
        );
    }

    #[test]
    fn expansion_is_deterministic() {
        let spec = parse_yaml(ERRATA_YAML).unwrap();
        assert_eq!(expand(&spec, &ctx(1)).unwrap(), expand(&spec, &ctx(1)).unwrap());
    }

    #[test]
    fn one_issue_per_template_without_iterate() {
        let spec = parse_yaml(
            r#"
project: P
issues:
  - {summary: a, type: epic, id: a}
  - {summary: b, type: task, parent_id: a}
  - {summary: c, type: task}
"#,
        )
        .unwrap();
        let issues = expand(&spec, &ExpandContext::default()).unwrap();
        assert_eq!(keys(&issues), vec!["a", "a/issue-2", "issue-3"]);
        assert_eq!(issues[0].assignee, None);
    }

    #[test]
    fn unresolved_reference_produces_nothing() {
        let yaml = ERRATA_YAML.replace("parent_id: errata_task\n", "parent_id: errata_task_typo\n");
        let spec = parse_yaml(&yaml).unwrap();
        match expand(&spec, &ctx(0)) {
            Err(ExpandError::UnresolvedReference { issue, parent_id }) => {
                assert_eq!(issue, "issue-3");
                assert_eq!(parent_id, "errata_task_typo");
            }
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn id_shadowing_generated_key_is_rejected() {
        let spec = parse_yaml(
            r#"
project: P
issues:
  - {summary: e, type: epic, id: e}
  - {summary: anon, type: task, parent_id: e}
  - {summary: named, type: task, id: issue-2, parent_id: e}
  - {summary: sub, type: subtask, parent_id: issue-2}
"#,
        )
        .unwrap();
        let err = expand(&spec, &ExpandContext::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid issue id 'issue-2': 'issue-N' is reserved for templates without an id"
        );
    }

    #[test]
    fn expanded_keys_are_unique() {
        let spec = parse_yaml(ERRATA_YAML).unwrap();
        let mut issues = expand(&spec, &ctx(0)).unwrap();
        ensure_unique_keys(&issues).unwrap();

        let mut twin = issues[1].clone();
        twin.summary = "twin".into();
        issues.push(twin);
        match ensure_unique_keys(&issues) {
            Err(ExpandError::DuplicateInstance(key)) => assert_eq!(key, issues[1].key),
            other => panic!("expected DuplicateInstance, got {:?}", other),
        }
    }

    #[test]
    fn child_without_iterate_fans_out_per_parent_instance() {
        let spec = parse_yaml(
            r#"
project: P
issues:
  - summary: "Task {{ ENVIRONMENT.ARCH }}"
    type: task
    id: task
    iterate:
      - ARCH: x86_64
      - ARCH: aarch64
  - summary: "Check on {{ ENVIRONMENT.ARCH }}"
    type: subtask
    id: check
    parent_id: task
"#,
        )
        .unwrap();
        let issues = expand(&spec, &ExpandContext::default()).unwrap();
        assert_eq!(
            keys(&issues),
            vec!["task#0", "task#1", "task#0/check", "task#1/check"]
        );
        assert_eq!(issues[2].summary, "Check on x86_64");
        assert_eq!(issues[2].parent.as_deref(), Some("task#0"));
        assert_eq!(issues[3].summary, "Check on aarch64");
        assert_eq!(issues[3].parent.as_deref(), Some("task#1"));
    }

    #[test]
    fn iterating_child_cross_joins_with_parent_instances() {
        let spec = parse_yaml(
            r#"
project: P
issues:
  - summary: "T"
    type: task
    id: task
    iterate: [{A: "1"}, {A: "2"}]
  - summary: "{{ ENVIRONMENT.A }}-{{ ENVIRONMENT.B }}"
    type: subtask
    parent_id: task
    iterate: [{B: x}, {B: y}, {B: z}]
"#,
        )
        .unwrap();
        let issues = expand(&spec, &ExpandContext::default()).unwrap();
        let summaries: Vec<&str> = issues[2..].iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(summaries, vec!["1-x", "1-y", "1-z", "2-x", "2-y", "2-z"]);
        assert_eq!(issues[7].key, "task#1/issue-2#2");
    }

    #[test]
    fn environment_layering_order() {
        let spec = parse_yaml(
            r#"
project: P
issues:
  - summary: "{{ ENVIRONMENT.A }} {{ ENVIRONMENT.B }} {{ ENVIRONMENT.C }}"
    type: task
    environment: {A: template, B: template, C: template}
    iterate:
      - {C: entry}
"#,
        )
        .unwrap();
        let mut context = ExpandContext::default();
        context.environment = [("B", "runtime"), ("C", "runtime")].into_iter().collect();
        let issues = expand(&spec, &context).unwrap();
        assert_eq!(issues[0].summary, "template runtime entry");
    }

    #[test]
    fn undefined_variable_names_instance_and_variable() {
        let spec = parse_yaml(
            "project: P\nissues:\n  - {summary: 'Compose {{ COMPOSE.id }}', type: epic, id: e}\n",
        )
        .unwrap();
        match expand(&spec, &ExpandContext::default()) {
            Err(ExpandError::Expression { issue, source }) => {
                assert_eq!(issue, "e");
                assert_eq!(source.missing_variable(), Some("COMPOSE.id"));
                assert_eq!(source.template, "Compose {{ COMPOSE.id }}");
            }
            other => panic!("expected Expression, got {:?}", other),
        }
    }

    #[test]
    fn when_skips_instance_and_descendants() {
        let spec = parse_yaml(
            r#"
project: P
issues:
  - summary: "E"
    type: epic
    id: e
  - summary: "T {{ ENVIRONMENT.KIND }}"
    type: task
    id: t
    parent_id: e
    when: "ENVIRONMENT.KIND != 'docker'"
    iterate: [{KIND: rpm}, {KIND: docker}]
  - summary: "S"
    type: subtask
    parent_id: t
"#,
        )
        .unwrap();
        let issues = expand(&spec, &ExpandContext::default()).unwrap();
        assert_eq!(keys(&issues), vec!["e", "e/t#0", "e/t#0/issue-3"]);
    }

    #[test]
    fn assignee_overrides() {
        let spec = parse_yaml(
            r#"
project: P
defaults:
  assignee: "{{ ERRATUM.people_assigned_to }}"
issues:
  - {summary: a, type: epic, id: a}
  - {summary: b, type: task, parent_id: a, assignee: "qe-{{ ENVIRONMENT.TEAM }}", environment: {TEAM: kernel}}
"#,
        )
        .unwrap();
        let mut context = ctx(0);
        let issues = expand(&spec, &context).unwrap();
        assert_eq!(issues[0].assignee.as_deref(), Some("tester@example.com"));
        assert_eq!(issues[1].assignee.as_deref(), Some("qe-kernel"));

        context.assignee = AssigneeOverride::Fixed("someone".into());
        let issues = expand(&spec, &context).unwrap();
        assert!(issues.iter().all(|i| i.assignee.as_deref() == Some("someone")));

        context.assignee = AssigneeOverride::Unassigned;
        let issues = expand(&spec, &context).unwrap();
        assert!(issues.iter().all(|i| i.assignee.is_none()));
    }

    #[test]
    fn template_fields_override_defaults_per_key() {
        let spec = parse_yaml(
            r#"
project: P
defaults:
  fields: {Pool Team: default-pool, Story Points: 1}
issues:
  - summary: a
    type: epic
    fields: {Pool Team: "{{ ENVIRONMENT.POOL }}"}
    environment: {POOL: special}
"#,
        )
        .unwrap();
        let issues = expand(&spec, &ExpandContext::default()).unwrap();
        assert_eq!(issues[0].fields["Pool Team"], "special");
        assert_eq!(issues[0].fields["Story Points"], 1);
        // defaults are not mutated
        assert_eq!(spec.defaults.fields["Pool Team"], "default-pool");
    }

    #[test]
    fn render_with_uses_runtime_context() {
        let mut context = ctx(3);
        context.environment.insert("ARCH", "s390x");
        assert_eq!(
            render_with("ER#{{ ERRATUM.id }} r{{ ERRATUM.respin_count }} {{ ENVIRONMENT.ARCH }}", &context)
                .unwrap(),
            "ER#12345 r3 s390x"
        );
    }

    #[test]
    fn condition_with_uses_runtime_context() {
        let mut context = ctx(1);
        context.environment.insert("ARCH", "s390x");
        assert!(condition_with("ERRATUM.respin_count > 0 and ENVIRONMENT.ARCH == 's390x'", &context).unwrap());
        assert!(!condition_with("{{ ERRATUM.respin_count == 0 }}", &context).unwrap());
    }
}
