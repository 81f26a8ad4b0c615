//! Locating the settings file.
//!
//! Search order:
//! 1. An explicit path (`--settings`)
//! 2. The `EJ_SETTINGS` environment variable
//! 3. `.errata-jira.yaml` in the current directory or any parent
//! 4. `~/.config/errata-jira/settings.yaml`
//!
//! Explicit paths (1 and 2) must exist. The others are optional.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, Result};

/// Name of the per-project settings file.
pub const SETTINGS_FILE_NAME: &str = ".errata-jira.yaml";

/// Environment variable that points at a settings file.
pub const SETTINGS_ENV: &str = "EJ_SETTINGS";

/// Find the settings file to load, if any.
pub fn find_settings_file(explicit: Option<&Path>, cwd: &Path) -> Result<Option<PathBuf>> {
    let from_env = std::env::var(SETTINGS_ENV).ok().filter(|v| !v.is_empty());
    search(explicit, from_env.as_deref(), cwd, home_dir())
}

fn search(
    explicit: Option<&Path>,
    from_env: Option<&str>,
    cwd: &Path,
    home: Option<PathBuf>,
) -> Result<Option<PathBuf>> {
    // 1-2. Explicit locations must exist.
    if let Some(path) = explicit.map(Path::to_path_buf).or_else(|| from_env.map(PathBuf::from)) {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        return Ok(Some(path));
    }

    // 3. Walk up from cwd.
    if let Some(found) = find_upwards(cwd) {
        return Ok(Some(found));
    }

    // 4. User config directory.
    Ok(home
        .map(|h| h.join(".config").join("errata-jira").join("settings.yaml"))
        .filter(|p| p.is_file()))
}

/// Walk up the directory tree from `start` looking for `.errata-jira.yaml`.
pub fn find_upwards(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;
    let mut current = start.as_path();
    loop {
        let candidate = current.join(SETTINGS_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => return None,
        }
    }
}

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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
