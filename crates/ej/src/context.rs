//! Runtime context for command execution.
//!
//! The [`RuntimeContext`] holds what every command handler needs: the global
//! flags and the resolved settings. It also turns the shared context flags
//! into an [`ExpandContext`].

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::debug;

use errata_config::{Settings, find_settings_file, load_settings};
use errata_core::erratum::{Erratum, ErratumBuilder, load_erratum};
use errata_template::parser::find_spec;
use errata_template::types::{AssigneeOverride, Environment, ExpandContext};

use crate::cli::{ContextArgs, GlobalArgs};

/// Runtime context passed to every command handler.
///
/// Constructed once in `main` after CLI parsing, before command dispatch.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Whether to produce JSON output.
    pub json: bool,

    /// Quiet mode: suppress non-essential output.
    pub quiet: bool,

    /// Working directory config names are resolved against.
    pub cwd: PathBuf,

    pub settings: Settings,
}

impl RuntimeContext {
    /// Build a `RuntimeContext` from parsed global arguments, locating and
    /// loading the settings file.
    pub fn from_global_args(global: &GlobalArgs) -> Result<Self> {
        let cwd = env::current_dir().context("failed to determine current directory")?;
        let settings_file = find_settings_file(global.settings.as_deref(), &cwd)?;
        let settings = load_settings(settings_file.as_deref())?;

        Ok(Self {
            json: global.json,
            quiet: global.quiet,
            cwd,
            settings,
        })
    }

    /// Resolve the issue config path from an explicit argument or settings.
    pub fn resolve_issue_config(&self, arg: Option<&str>) -> Result<PathBuf> {
        let name = arg
            .or(self.settings.issue_config.as_deref())
            .context("no issue config given (pass CONFIG or set issue_config in settings)")?;
        let path = find_spec(name, &self.cwd)?;
        debug!(name, path = %path.display(), "resolved issue config");
        Ok(path)
    }

    /// Build the expansion context from the shared flags.
    ///
    /// Environment precedence: settings < `-e` flags. Assignee precedence:
    /// template < settings < `--assignee`/`--unassigned`.
    pub fn expand_context(&self, args: &ContextArgs) -> Result<ExpandContext> {
        let erratum = build_erratum(args)?;

        let mut environment: Environment = self
            .settings
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in parse_env_flags(&args.env)? {
            environment.insert(key, value);
        }

        let assignee = if args.unassigned {
            AssigneeOverride::Unassigned
        } else if let Some(ref user) = args.assignee {
            AssigneeOverride::Fixed(user.clone())
        } else if let Some(ref user) = self.settings.assignee {
            AssigneeOverride::Fixed(user.clone())
        } else {
            AssigneeOverride::Template
        };

        Ok(ExpandContext {
            erratum,
            environment,
            assignee,
        })
    }
}

/// Load the erratum record (if given) and apply flag overrides.
fn build_erratum(args: &ContextArgs) -> Result<Erratum> {
    let mut erratum = match args.erratum {
        Some(ref path) => load_erratum(path)
            .with_context(|| format!("failed to load erratum {}", path.display()))?,
        None => ErratumBuilder::new(args.erratum_id.clone().unwrap_or_default()).build(),
    };
    if let Some(ref id) = args.erratum_id {
        erratum.id = id.clone();
    }
    if let Some(respin) = args.respin {
        erratum.respin_count = respin;
    }
    if let Some(ref release) = args.release {
        erratum.release = release.clone();
    }
    if let Some(ref summary) = args.summary {
        erratum.summary = summary.clone();
    }
    Ok(erratum)
}

/// Parse `-e KEY=VALUE` flags.
fn parse_env_flags(pairs: &[String]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => out.push((key.to_string(), value.to_string())),
            _ => bail!("invalid environment variable '{}': expected KEY=VALUE", pair),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(settings: Settings) -> RuntimeContext {
        RuntimeContext {
            json: false,
            quiet: false,
            cwd: PathBuf::from("."),
            settings,
        }
    }

    #[test]
    fn parse_env_flags_splits_on_first_equals() {
        let parsed = parse_env_flags(&["A=1".into(), "URL=a=b".into(), "EMPTY=".into()]).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("URL".to_string(), "a=b".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
        assert!(parse_env_flags(&["novalue".into()]).is_err());
        assert!(parse_env_flags(&["=x".into()]).is_err());
    }

    #[test]
    fn flags_override_erratum_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erratum.yaml");
        std::fs::write(&path, "id: 100\nsummary: from file\nrespin_count: 1\n").unwrap();
        let args = ContextArgs {
            erratum: Some(path),
            respin: Some(3),
            ..ContextArgs::default()
        };
        let erratum = build_erratum(&args).unwrap();
        assert_eq!(erratum.id, "100");
        assert_eq!(erratum.summary, "from file");
        assert_eq!(erratum.respin_count, 3);
    }

    #[test]
    fn cli_environment_overrides_settings() {
        let mut settings = Settings::default();
        settings.environment.insert("ARCH".into(), "x86_64".into());
        settings.environment.insert("KEEP".into(), "yes".into());
        let args = ContextArgs {
            env: vec!["ARCH=s390x".into()],
            ..ContextArgs::default()
        };
        let expand_ctx = ctx(settings).expand_context(&args).unwrap();
        assert_eq!(expand_ctx.environment.get("ARCH"), Some("s390x"));
        assert_eq!(expand_ctx.environment.get("KEEP"), Some("yes"));
    }

    #[test]
    fn assignee_precedence() {
        let settings = Settings {
            assignee: Some("from-settings".into()),
            ..Settings::default()
        };
        let runtime = ctx(settings);

        let expand_ctx = runtime.expand_context(&ContextArgs::default()).unwrap();
        assert_eq!(expand_ctx.assignee, AssigneeOverride::Fixed("from-settings".into()));

        let args = ContextArgs {
            assignee: Some("me".into()),
            ..ContextArgs::default()
        };
        assert_eq!(
            runtime.expand_context(&args).unwrap().assignee,
            AssigneeOverride::Fixed("me".into())
        );

        let args = ContextArgs {
            unassigned: true,
            ..ContextArgs::default()
        };
        assert_eq!(
            runtime.expand_context(&args).unwrap().assignee,
            AssigneeOverride::Unassigned
        );

        let plain = ctx(Settings::default());
        assert_eq!(
            plain.expand_context(&ContextArgs::default()).unwrap().assignee,
            AssigneeOverride::Template
        );
    }

    #[test]
    fn settings_and_flags_override_template_assignee() {
        use errata_template::expand;
        use errata_template::parser::parse_yaml;

        let spec = parse_yaml(
            "project: P\nissues:\n  - {summary: e, type: epic, id: e, assignee: from-template}\n",
        )
        .unwrap();
        let assignee = |runtime: &RuntimeContext, args: &ContextArgs| {
            let expand_ctx = runtime.expand_context(args).unwrap();
            expand(&spec, &expand_ctx).unwrap()[0].assignee.clone()
        };

        let plain = ctx(Settings::default());
        assert_eq!(assignee(&plain, &ContextArgs::default()), Some("from-template".into()));

        let runtime = ctx(Settings {
            assignee: Some("from-settings".into()),
            ..Settings::default()
        });
        assert_eq!(assignee(&runtime, &ContextArgs::default()), Some("from-settings".into()));

        let args = ContextArgs {
            assignee: Some("me".into()),
            ..ContextArgs::default()
        };
        assert_eq!(assignee(&runtime, &args), Some("me".into()));
    }

    #[test]
    fn missing_issue_config_is_reported() {
        let err = ctx(Settings::default()).resolve_issue_config(None).unwrap_err();
        assert!(err.to_string().contains("no issue config given"));
    }
}
