//! Issue-template document model and the resolved issues it expands into.
//!
//! Covers: project, transitions, defaults, issue templates (with `iterate`,
//! `environment`, `when`), and the fully-resolved issue-creation requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use errata_core::enums::{IssueType, OnRespin, TransitionCategory};

/// Free-form mapping of field or context values.
pub type ValueMap = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// String-to-string environment mapping.
///
/// Scalar YAML values (numbers, booleans, null) are coerced to strings on
/// load. Nested mappings and sequences are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Returns a new environment with `overlay` applied on top of `self`.
    /// Keys present in `overlay` win.
    pub fn layered(&self, overlay: &Environment) -> Environment {
        let mut merged = self.0.clone();
        for (k, v) in &overlay.0 {
            merged.insert(k.clone(), v.clone());
        }
        Environment(merged)
    }

    /// JSON object exposed to templates as `ENVIRONMENT`.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Environment(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?
            .unwrap_or_default();
        let mut env = BTreeMap::new();
        for (key, value) in raw {
            let s = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => {
                    return Err(D::Error::custom(format!(
                        "environment variable '{}' must be a scalar value",
                        key
                    )));
                }
            };
            env.insert(key, s);
        }
        Ok(Environment(env))
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root structure of an issue-config document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Jira project key.
    #[serde(default)]
    pub project: String,

    /// Optional security group new issues are restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default)]
    pub transitions: Transitions,

    #[serde(default)]
    pub defaults: Defaults,

    /// Other documents merged underneath this one (see the parser).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default)]
    pub issues: Vec<IssueTemplate>,

    /// Where this document was loaded from (set by the parser).
    #[serde(skip)]
    pub source: String,
}

impl WorkflowSpec {
    /// Look up a template by its `id`.
    pub fn template(&self, id: &str) -> Option<&IssueTemplate> {
        self.issues.iter().find(|t| t.id.as_deref() == Some(id))
    }
}

/// Jira status labels grouped by what moving into them means.
///
/// A label may appear in more than one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transitions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub closed: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processed: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passed: Vec<String>,
}

impl Transitions {
    /// Labels declared for a category, in document order.
    pub fn labels(&self, category: TransitionCategory) -> &[String] {
        match category {
            TransitionCategory::Closed => &self.closed,
            TransitionCategory::Dropped => &self.dropped,
            TransitionCategory::Processed => &self.processed,
            TransitionCategory::Passed => &self.passed,
        }
    }

    fn labels_mut(&mut self, category: TransitionCategory) -> &mut Vec<String> {
        match category {
            TransitionCategory::Closed => &mut self.closed,
            TransitionCategory::Dropped => &mut self.dropped,
            TransitionCategory::Processed => &mut self.processed,
            TransitionCategory::Passed => &mut self.passed,
        }
    }

    /// The label an issue is moved to for a category (the first declared one).
    pub fn target(&self, category: TransitionCategory) -> Option<&str> {
        self.labels(category).first().map(String::as_str)
    }

    /// Every category a status label belongs to.
    pub fn categories_of(&self, label: &str) -> Vec<TransitionCategory> {
        TransitionCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.labels(*c).iter().any(|l| l.eq_ignore_ascii_case(label)))
            .collect()
    }

    /// Replace each category of `self` that `overlay` declares.
    pub fn overlay(&mut self, overlay: &Transitions) {
        for category in TransitionCategory::ALL {
            let labels = overlay.labels(*category);
            if !labels.is_empty() {
                *self.labels_mut(*category) = labels.to_vec();
            }
        }
    }
}

/// Document-wide defaults applied to every template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    /// Assignee expression, e.g. `"{{ ERRATUM.people_assigned_to }}"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Default Jira field values keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: ValueMap,
}

/// One issue template; expands into one or more resolved issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTemplate {
    /// Issue summary (expression template).
    pub summary: String,

    /// Issue description (expression template).
    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub issue_type: IssueType,

    /// Unique key other templates use in `parent_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub on_respin: OnRespin,

    #[serde(default, deserialize_with = "deserialize_flag")]
    pub auto_transition: bool,

    /// Job recipe URL, passed through to the job runner uninterpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_recipe: Option<String>,

    /// Variable bindings; one instance is produced per entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterate: Option<Vec<Environment>>,

    /// Default environment variables for every instance.
    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,

    /// Free-form mapping passed through to the job runner.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: ValueMap,

    /// Assignee expression overriding `defaults.assignee`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Field values overriding `defaults.fields` key by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: ValueMap,

    /// Condition; instances for which it is falsy are skipped.
    ///
    /// Environment values are strings, so `ENABLED: false` binds the truthy
    /// string `"false"`. Compare explicitly: `ENVIRONMENT.ENABLED == 'true'`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl IssueTemplate {
    /// Creates a template with only the required fields set.
    pub fn new(issue_type: IssueType, summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            description: String::new(),
            issue_type,
            id: None,
            parent_id: None,
            on_respin: OnRespin::default(),
            auto_transition: false,
            job_recipe: None,
            iterate: None,
            environment: Environment::new(),
            context: ValueMap::new(),
            assignee: None,
            fields: ValueMap::new(),
            when: None,
        }
    }

    /// Key identifying this template in instance keys and error messages.
    ///
    /// `index` is the template's 0-based position in `issues`.
    pub fn key(&self, index: usize) -> String {
        match self.id {
            Some(ref id) => id.clone(),
            None => format!("issue-{}", index + 1),
        }
    }

    /// Iterate bindings to expand, paired with their index.
    ///
    /// A missing or empty `iterate` yields a single unindexed, empty binding.
    pub fn iterations(&self) -> Vec<(Option<usize>, Environment)> {
        match self.iterate {
            Some(ref entries) if !entries.is_empty() => entries
                .iter()
                .enumerate()
                .map(|(i, e)| (Some(i), e.clone()))
                .collect(),
            _ => vec![(None, Environment::new())],
        }
    }
}

/// Accept YAML 1.1 spellings (`True`, `yes`, `off`) as well as real booleans.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Null => Ok(false),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("expected a boolean, got '{}'", s))),
        },
        other => Err(D::Error::custom(format!("expected a boolean, got {}", other))),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A fully-expanded issue-creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedIssue {
    /// Unique instance key, e.g. `errata_task/subtask#1`.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub summary: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub fields: ValueMap,
    /// Instance key of the parent issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub on_respin: OnRespin,
    pub auto_transition: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_recipe: Option<String>,
    pub environment: Environment,
    pub context: ValueMap,
    /// Index into the template's `iterate` list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
}

/// Who resolved issues are assigned to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AssigneeOverride {
    /// Use the template (or default) assignee expression.
    #[default]
    Template,
    /// Assign every issue to this user.
    Fixed(String),
    /// Leave every issue unassigned.
    Unassigned,
}

/// Runtime inputs for an expansion.
#[derive(Debug, Clone, Default)]
pub struct ExpandContext {
    pub erratum: errata_core::erratum::Erratum,
    /// Environment supplied by the caller (CLI `-e`, settings).
    pub environment: Environment,
    pub assignee: AssigneeOverride,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn environment_coerces_scalars() {
        let env: Environment = serde_yaml::from_str("A: 1\nB: true\nC: text\nD:\n").unwrap();
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("true"));
        assert_eq!(env.get("C"), Some("text"));
        assert_eq!(env.get("D"), Some(""));
    }

    #[test]
    fn environment_rejects_nested() {
        let err = serde_yaml::from_str::<Environment>("A:\n  nested: 1\n").unwrap_err();
        assert!(err.to_string().contains("'A' must be a scalar"));
    }

    #[test]
    fn environment_layering_overlay_wins() {
        let base: Environment = [("FOO", "base"), ("KEEP", "yes")].into_iter().collect();
        let top: Environment = [("FOO", "top")].into_iter().collect();
        let merged = base.layered(&top);
        assert_eq!(merged.get("FOO"), Some("top"));
        assert_eq!(merged.get("KEEP"), Some("yes"));
    }

    #[test]
    fn auto_transition_accepts_capitalized_true() {
        let t: IssueTemplate =
            serde_yaml::from_str("summary: s\ntype: task\nauto_transition: True\n").unwrap();
        assert!(t.auto_transition);
        let t: IssueTemplate = serde_yaml::from_str("summary: s\ntype: task\n").unwrap();
        assert!(!t.auto_transition);
        assert_eq!(t.on_respin, OnRespin::Close);
    }

    #[test]
    fn iterations_empty_list_is_single_instance() {
        let mut t = IssueTemplate::new(IssueType::Task, "s");
        assert_eq!(t.iterations().len(), 1);
        t.iterate = Some(vec![]);
        let its = t.iterations();
        assert_eq!(its.len(), 1);
        assert_eq!(its[0].0, None);
        t.iterate = Some(vec![Environment::new(), Environment::new()]);
        assert_eq!(t.iterations().len(), 2);
    }

    #[test]
    fn template_key_falls_back_to_position() {
        let mut t = IssueTemplate::new(IssueType::Task, "s");
        assert_eq!(t.key(2), "issue-3");
        t.id = Some("errata_task".into());
        assert_eq!(t.key(2), "errata_task");
    }

    #[test]
    fn transitions_lookup() {
        let t: Transitions = serde_yaml::from_str(
            "closed: [Closed, Done]\ndropped: [Closed]\nprocessed: [In Progress]\n",
        )
        .unwrap();
        assert_eq!(t.target(TransitionCategory::Closed), Some("Closed"));
        assert_eq!(t.target(TransitionCategory::Passed), None);
        assert_eq!(
            t.categories_of("closed"),
            vec![TransitionCategory::Closed, TransitionCategory::Dropped]
        );
    }

    #[test]
    fn transitions_overlay_replaces_declared_categories() {
        let mut base = Transitions {
            closed: vec!["Closed".into()],
            passed: vec!["Done".into()],
            ..Transitions::default()
        };
        let top = Transitions {
            closed: vec!["Obsolete".into()],
            ..Transitions::default()
        };
        base.overlay(&top);
        assert_eq!(base.closed, vec!["Obsolete"]);
        assert_eq!(base.passed, vec!["Done"]);
    }
}
