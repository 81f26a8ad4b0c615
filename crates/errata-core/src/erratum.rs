//! Erratum record -- the runtime context templates are rendered against.
//!
//! Every field is exposed to templates under the `ERRATUM` namespace root,
//! e.g. `{{ ERRATUM.id }}` or `{{ ERRATUM.respin_count }}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

/// Errors raised while loading an erratum record.
#[derive(Debug, thiserror::Error)]
pub enum ErratumError {
    #[error("failed to read erratum file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse erratum: {0}")]
    Parse(String),

    #[error("erratum id is required")]
    MissingId,
}

/// An errata record (patch/update bundle) being tested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Erratum {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub release: String,

    /// Number of respins so far; 0 for the first build.
    #[serde(default)]
    pub respin_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_assigned_to: Option<String>,

    /// Content type, e.g. `rpm`, `docker`, `module`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builds: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,

    /// Any other keys present in the source record.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Erratum {
    /// Converts the record into the JSON value exposed as `ERRATUM`.
    ///
    /// Unset optional fields are omitted, so `ERRATUM.url is defined` is false
    /// for an erratum without a URL.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Whether this erratum is a respin of an earlier build.
    pub fn is_respin(&self) -> bool {
        self.respin_count > 0
    }
}

/// Errata ids are numeric in most trackers; accept them unquoted.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// Parse an erratum from a YAML (or JSON, which is valid YAML) string.
pub fn parse_erratum(content: &str) -> Result<Erratum, ErratumError> {
    let erratum: Erratum =
        serde_yaml::from_str(content).map_err(|e| ErratumError::Parse(e.to_string()))?;
    if erratum.id.trim().is_empty() {
        return Err(ErratumError::MissingId);
    }
    Ok(erratum)
}

/// Load an erratum record from a file.
pub fn load_erratum(path: &Path) -> Result<Erratum, ErratumError> {
    let content = std::fs::read_to_string(path)?;
    parse_erratum(&content)
}

/// Builder for constructing an [`Erratum`] with a fluent API.
pub struct ErratumBuilder {
    erratum: Erratum,
}

impl ErratumBuilder {
    /// Creates a new builder with the given erratum id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            erratum: Erratum {
                id: id.into(),
                ..Erratum::default()
            },
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.erratum.summary = summary.into();
        self
    }

    pub fn release(mut self, release: impl Into<String>) -> Self {
        self.erratum.release = release.into();
        self
    }

    pub fn respin_count(mut self, respin_count: u32) -> Self {
        self.erratum.respin_count = respin_count;
        self
    }

    pub fn people_assigned_to(mut self, who: impl Into<String>) -> Self {
        self.erratum.people_assigned_to = Some(who.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.erratum.content_type = Some(content_type.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.erratum.url = Some(url.into());
        self
    }

    pub fn build_nvr(mut self, nvr: impl Into<String>) -> Self {
        self.erratum.builds.push(nvr.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.erratum.extra.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Erratum {
        self.erratum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_sets_fields() {
        let e = ErratumBuilder::new("12345")
            .summary("bash bugfix update")
            .release("RHEL-9.4.0")
            .respin_count(2)
            .people_assigned_to("qe@example.com")
            .build();
        assert_eq!(e.id, "12345");
        assert_eq!(e.respin_count, 2);
        assert!(e.is_respin());
        assert_eq!(e.people_assigned_to.as_deref(), Some("qe@example.com"));
    }

    #[test]
    fn to_value_omits_unset_optionals() {
        let e = ErratumBuilder::new("1").build();
        let v = e.to_value();
        assert_eq!(v["id"], "1");
        assert_eq!(v["respin_count"], 0);
        assert!(v.get("url").is_none());
        assert!(v.get("builds").is_none());
    }

    #[test]
    fn parse_keeps_extra_keys() {
        let yaml = "id: '777'\nsummary: kernel update\nrespin_count: 1\nsynopsis: Important\n";
        let e = parse_erratum(yaml).unwrap();
        assert_eq!(e.id, "777");
        assert_eq!(e.respin_count, 1);
        assert_eq!(e.extra["synopsis"], "Important");
        assert_eq!(e.to_value()["synopsis"], "Important");
    }

    #[test]
    fn parse_requires_id() {
        let err = parse_erratum("summary: nothing\n").unwrap_err();
        assert!(matches!(err, ErratumError::MissingId));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erratum.yaml");
        std::fs::write(&path, "id: '42'\nrelease: RHEL-8.10.0\n").unwrap();
        let e = load_erratum(&path).unwrap();
        assert_eq!(e.release, "RHEL-8.10.0");
    }

    #[test]
    fn numeric_id_accepted() {
        let e = parse_erratum("id: 131311\n").unwrap();
        assert_eq!(e.id, "131311");
    }
}
