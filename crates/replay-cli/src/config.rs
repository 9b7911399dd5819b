//! `replay.toml` configuration
//!
//! ```toml
//! coverage = "expected"
//!
//! [executor]
//! exception-policy = "structural"
//! jobs = 4
//! catch-panics = true
//! ```

use anyhow::Context;
use replay_engine::{ExceptionPolicy, ExecutorOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG: &str = "replay.toml";

/// Post-batch coverage check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageMode {
    /// No check
    #[default]
    None,
    /// Compare against the method's declared expected coverage
    Expected,
}

/// CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CliConfig {
    pub executor: ExecutorOptions,
    pub coverage: CoverageMode,
}

impl CliConfig {
    /// Parse configuration text
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Load `explicit`, or `replay.toml` if it exists, or defaults
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG).is_file() => Path::new(DEFAULT_CONFIG),
            None => return Ok(Self::default()),
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, policy: Option<&str>, jobs: Option<usize>, coverage: bool) -> anyhow::Result<Self> {
        if let Some(policy) = policy {
            self.executor.exception_policy = parse_policy(policy)?;
        }
        if let Some(jobs) = jobs {
            self.executor.jobs = jobs;
        }
        if coverage {
            self.coverage = CoverageMode::Expected;
        }
        Ok(self)
    }
}

fn parse_policy(text: &str) -> anyhow::Result<ExceptionPolicy> {
    match text {
        "runtime-type" => Ok(ExceptionPolicy::RuntimeType),
        "structural" => Ok(ExceptionPolicy::Structural),
        other => anyhow::bail!("unknown exception policy '{}' (expected runtime-type or structural)", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.executor.exception_policy, ExceptionPolicy::RuntimeType);
        assert_eq!(config.executor.jobs, 1);
        assert!(config.executor.catch_panics);
    }

    #[test]
    fn test_full_config() {
        let config = CliConfig::parse(
            r#"
            coverage = "expected"

            [executor]
            exception-policy = "structural"
            jobs = 0
            catch-panics = false
            "#,
        )
        .unwrap();
        assert_eq!(config.coverage, CoverageMode::Expected);
        assert_eq!(config.executor.exception_policy, ExceptionPolicy::Structural);
        assert_eq!(config.executor.jobs, 0);
        assert!(!config.executor.catch_panics);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(CliConfig::parse("[executor]\nexception-policy = \"by-message\"").is_err());
        assert!(CliConfig::default().with_overrides(Some("by-message"), None, false).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let config = CliConfig::parse("[executor]\njobs = 8")
            .unwrap()
            .with_overrides(Some("structural"), Some(2), true)
            .unwrap();
        assert_eq!(config.executor.jobs, 2);
        assert_eq!(config.executor.exception_policy, ExceptionPolicy::Structural);
        assert_eq!(config.coverage, CoverageMode::Expected);
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/replay.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
