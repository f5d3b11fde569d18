#[macro_use]
extern crate tracing;

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::Duration;

use miette::{Context as _, IntoDiagnostic as _};

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Config {
    #[knuffel(child)]
    pub allow_background_activity_starts: bool,
    #[knuffel(child)]
    pub log_activity_starts: bool,
    #[knuffel(child, default)]
    pub recents: Recents,
    #[knuffel(child, default)]
    pub debug: DebugConfig,
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq)]
pub struct Recents {
    #[knuffel(child, unwrap(argument), default = Self::default().freeze_timeout_ms)]
    pub freeze_timeout_ms: u64,
    #[knuffel(child, unwrap(argument), default = Self::default().max_tasks)]
    pub max_tasks: usize,
}

impl Default for Recents {
    fn default() -> Self {
        Self {
            freeze_timeout_ms: 5000,
            max_tasks: 50,
        }
    }
}

impl Recents {
    pub fn freeze_timeout(&self) -> Duration {
        Duration::from_millis(self.freeze_timeout_ms)
    }
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct DebugConfig {
    #[knuffel(child)]
    pub trace_visibility: bool,
}

impl Config {
    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        let _span = tracing::debug_span!("Config::parse").entered();
        knuffel::parse(filename, text)
    }

    pub fn load(path: &Path) -> miette::Result<Self> {
        let contents = fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("error reading {path:?}"))?;

        let filename = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("config.kdl");
        let config = Self::parse(filename, &contents).context("error parsing")?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[track_caller]
    fn do_parse(text: &str) -> Config {
        Config::parse("test.kdl", text)
            .map_err(miette::Report::new)
            .unwrap()
    }

    #[test]
    fn default_config_file_matches_default() {
        let config = do_parse(include_str!("../../resources/default-config.kdl"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(do_parse(""), Config::default());
    }

    #[test]
    fn parse_everything() {
        let config = do_parse(
            r#"
            allow-background-activity-starts

            recents {
                freeze-timeout-ms 2500
            }

            debug {
                trace-visibility
            }
            "#,
        );

        assert_debug_snapshot!(config, @r"
        Config {
            allow_background_activity_starts: true,
            log_activity_starts: false,
            recents: Recents {
                freeze_timeout_ms: 2500,
                max_tasks: 50,
            },
            debug: DebugConfig {
                trace_visibility: true,
            },
        }
        ");
        assert_eq!(config.recents.freeze_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn rejects_unknown_nodes() {
        assert!(Config::parse("test.kdl", "launch-everything").is_err());
    }

    #[test]
    fn rejects_bad_timeout() {
        assert!(Config::parse("test.kdl", "recents { freeze-timeout-ms \"soon\"; }").is_err());
    }
}
