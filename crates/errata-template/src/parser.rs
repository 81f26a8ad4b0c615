//! Parse issue-config documents (YAML, JSON, TOML), merge includes, and
//! resolve config names to paths.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ExpandError;
use crate::types::WorkflowSpec;

/// Parse a document from a YAML string.
pub fn parse_yaml(content: &str) -> Result<WorkflowSpec, ExpandError> {
    serde_yaml::from_str(content).map_err(|e| ExpandError::Parse(e.to_string()))
}

/// Parse a document from a JSON string.
pub fn parse_json(content: &str) -> Result<WorkflowSpec, ExpandError> {
    serde_json::from_str(content).map_err(|e| ExpandError::Parse(e.to_string()))
}

/// Parse a document from a TOML string.
pub fn parse_toml(content: &str) -> Result<WorkflowSpec, ExpandError> {
    toml::from_str(content).map_err(|e| ExpandError::Parse(e.to_string()))
}

/// Parse a single file without following `include`.
pub fn parse_file(path: &Path) -> Result<WorkflowSpec, ExpandError> {
    let content = std::fs::read_to_string(path)?;
    let mut spec = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json(&content)?,
        Some("toml") => parse_toml(&content)?,
        Some("yaml") | Some("yml") => parse_yaml(&content)?,
        // YAML also accepts JSON, so TOML is the only other candidate.
        _ => parse_yaml(&content).or_else(|_| parse_toml(&content))?,
    };
    spec.source = path.display().to_string();
    Ok(spec)
}

/// Load a document and everything it includes.
///
/// Included documents are resolved relative to the including file and merged
/// underneath it: their issues come first, and anything the including file
/// sets wins.
pub fn load_spec(path: &Path) -> Result<WorkflowSpec, ExpandError> {
    let mut chain = Vec::new();
    let spec = load_recursive(path, &mut chain)?;
    info!(
        source = %spec.source,
        project = %spec.project,
        issues = spec.issues.len(),
        "loaded issue config"
    );
    Ok(spec)
}

fn load_recursive(path: &Path, chain: &mut Vec<PathBuf>) -> Result<WorkflowSpec, ExpandError> {
    let canonical = path.canonicalize()?;
    if chain.contains(&canonical) {
        let mut names: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
        names.push(canonical.display().to_string());
        return Err(ExpandError::IncludeCycle { chain: names });
    }

    let spec = parse_file(path)?;
    if spec.include.is_empty() {
        return Ok(spec);
    }

    chain.push(canonical);
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut merged = WorkflowSpec::default();
    for include in &spec.include {
        let include_path = base_dir.join(include);
        debug!(from = %spec.source, include = %include_path.display(), "following include");
        let included = load_recursive(&include_path, chain)?;
        merge(&mut merged, included);
    }
    chain.pop();

    merge(&mut merged, spec);
    Ok(merged)
}

/// Merge `top` over `base`.
fn merge(base: &mut WorkflowSpec, top: WorkflowSpec) {
    if !top.project.is_empty() {
        base.project = top.project;
    }
    if top.group.is_some() {
        base.group = top.group;
    }
    base.transitions.overlay(&top.transitions);
    if top.defaults.assignee.is_some() {
        base.defaults.assignee = top.defaults.assignee;
    }
    base.defaults.fields.extend(top.defaults.fields);
    base.issues.extend(top.issues);
    base.include.clear();
    base.source = top.source;
}

/// Resolve an issue-config name to a file.
///
/// Search order:
/// 1. Exact path (absolute, or relative to `cwd`)
/// 2. `cwd` with `.yaml`, `.yml`, `.json`, `.toml` appended
/// 3. `issue-configs/` under `cwd`
/// 4. `~/.config/errata-jira/issue-configs/`
pub fn find_spec(name: &str, cwd: &Path) -> Result<PathBuf, ExpandError> {
    let exact = Path::new(name);
    if exact.is_absolute() && exact.exists() {
        return Ok(exact.to_path_buf());
    }
    let relative = cwd.join(name);
    if relative.is_file() {
        return Ok(relative);
    }

    let mut dirs = vec![cwd.to_path_buf(), cwd.join("issue-configs")];
    if let Some(home) = home_dir() {
        dirs.push(home.join(".config").join("errata-jira").join("issue-configs"));
    }

    for dir in dirs.iter().filter(|d| d.is_dir()) {
        if let Some(found) = with_suffixes(dir, name) {
            return Ok(found);
        }
    }

    Err(ExpandError::NotFound(name.to_string()))
}

fn with_suffixes(dir: &Path, name: &str) -> Option<PathBuf> {
    if dir.join(name).is_file() {
        return Some(dir.join(name));
    }
    [".yaml", ".yml", ".json", ".toml"]
        .iter()
        .map(|suffix| dir.join(format!("{}{}", name, suffix)))
        .find(|candidate| candidate.is_file())
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
