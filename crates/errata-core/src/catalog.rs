//! Service-catalog descriptor (`catalog-info.yaml`).
//!
//! The descriptor is purely metadata for an external service registry. It is
//! loaded and checked here so a broken descriptor is caught in CI rather than
//! by the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors found while loading or checking a catalog descriptor.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog descriptor: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse catalog descriptor: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid entity name '{0}' (use letters, digits, '-', '_' and '.')")]
    InvalidName(String),

    #[error("invalid entity reference '{0}'")]
    InvalidEntityRef(String),

    #[error("link '{0}' is not an http(s) URL")]
    InvalidLink(String),
}

/// Top-level descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogInfo {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: CatalogMetadata,

    #[serde(default)]
    pub spec: CatalogSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub links: Vec<CatalogLink>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogLink {
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSpec {
    #[serde(default, rename = "type")]
    pub component_type: String,

    #[serde(default)]
    pub lifecycle: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A parsed `[kind:][namespace/]name` reference to another catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
}

impl EntityRef {
    /// Parse an entity reference string.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        let invalid = || CatalogError::InvalidEntityRef(s.to_string());
        let (kind, rest) = match s.split_once(':') {
            Some((k, r)) => (Some(k), r),
            None => (None, s),
        };
        let (namespace, name) = match rest.split_once('/') {
            Some((ns, n)) => (Some(ns), n),
            None => (None, rest),
        };
        for part in [kind, namespace, Some(name)].into_iter().flatten() {
            if !is_valid_name(part) {
                return Err(invalid());
            }
        }
        Ok(Self {
            kind: kind.map(str::to_string),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref kind) = self.kind {
            write!(f, "{}:", kind)?;
        }
        if let Some(ref ns) = self.namespace {
            write!(f, "{}/", ns)?;
        }
        f.write_str(&self.name)
    }
}

fn is_valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl CatalogInfo {
    /// Check required fields, names, links and dependency references.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.api_version.is_empty() {
            return Err(CatalogError::MissingField("apiVersion"));
        }
        if self.kind.is_empty() {
            return Err(CatalogError::MissingField("kind"));
        }
        if self.metadata.name.is_empty() {
            return Err(CatalogError::MissingField("metadata.name"));
        }
        if !is_valid_name(&self.metadata.name) {
            return Err(CatalogError::InvalidName(self.metadata.name.clone()));
        }
        if self.spec.owner.is_empty() {
            return Err(CatalogError::MissingField("spec.owner"));
        }
        EntityRef::parse(&self.spec.owner)?;
        for link in &self.metadata.links {
            if !(link.url.starts_with("https://") || link.url.starts_with("http://")) {
                return Err(CatalogError::InvalidLink(link.url.clone()));
            }
        }
        for dep in &self.spec.depends_on {
            EntityRef::parse(dep)?;
        }
        Ok(())
    }

    /// Parsed `spec.dependsOn` references, skipping malformed ones.
    pub fn dependencies(&self) -> Vec<EntityRef> {
        self.spec
            .depends_on
            .iter()
            .filter_map(|d| EntityRef::parse(d).ok())
            .collect()
    }
}

/// Parse a descriptor from YAML.
pub fn parse_catalog(content: &str) -> Result<CatalogInfo, CatalogError> {
    Ok(serde_yaml::from_str(content)?)
}

/// Load a descriptor from a file.
pub fn load_catalog(path: &Path) -> Result<CatalogInfo, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog(&content)
}
