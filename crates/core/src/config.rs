use crate::error::{DistributionError, DistributionResult};
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `FEEDSHARE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

/// What to do when two input rows share a natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Reject every row carrying the duplicated key and keep going.
    #[default]
    RejectKey,
    /// Abort the run before any group is distributed.
    FailRun,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RejectKey => write!(f, "reject_key"),
            Self::FailRun => write!(f, "fail_run"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject_key" | "reject-key" => Ok(Self::RejectKey),
            "fail_run" | "fail-run" => Ok(Self::FailRun),
            other => Err(DistributionError::Config(format!(
                "unknown duplicate policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    /// Worker threads used to distribute groups. `1` runs inline.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Fraction of rejected input rows above which the run is aborted.
    #[serde(default = "default_max_rejection_ratio")]
    pub max_rejection_ratio: f64,
    /// Fraction of failed groups above which remaining groups are abandoned.
    #[serde(default = "default_max_group_failure_ratio")]
    pub max_group_failure_ratio: f64,
    /// Wall-clock budget for a run; `None` means unbounded.
    #[serde(default)]
    pub max_run_duration_ms: Option<u64>,
    /// Emit zero-valued `is_feed_data = false` rows for feeds that report nothing.
    #[serde(default = "default_emit_fallback_records")]
    pub emit_fallback_records: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_max_query_days")]
    pub max_query_days: i64,
}

// Default functions
fn default_workers() -> usize {
    1
}
fn default_max_rejection_ratio() -> f64 {
    0.5
}
fn default_max_group_failure_ratio() -> f64 {
    0.25
}
fn default_emit_fallback_records() -> bool {
    true
}
fn default_max_query_days() -> i64 {
    365
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            duplicate_policy: DuplicatePolicy::default(),
            max_rejection_ratio: default_max_rejection_ratio(),
            max_group_failure_ratio: default_max_group_failure_ratio(),
            max_run_duration_ms: None,
            emit_fallback_records: default_emit_fallback_records(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            max_query_days: default_max_query_days(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            distribution: DistributionConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl DistributionConfig {
    pub fn validate(&self) -> DistributionResult<()> {
        if self.workers == 0 {
            return Err(DistributionError::Config(
                "distribution.workers must be at least 1".to_string(),
            ));
        }
        for (name, ratio) in [
            ("max_rejection_ratio", self.max_rejection_ratio),
            ("max_group_failure_ratio", self.max_group_failure_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(DistributionError::Config(format!(
                    "distribution.{name} must be within [0, 1], got {ratio}"
                )));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load(path: Option<&str>) -> DistributionResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("FEEDSHARE")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DistributionResult<()> {
        self.distribution.validate()?;
        if self.reporting.max_query_days < 0 {
            return Err(DistributionError::Config(
                "reporting.max_query_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.distribution.workers, 1);
        assert_eq!(config.distribution.duplicate_policy, DuplicatePolicy::RejectKey);
        assert_eq!(config.reporting.max_query_days, 365);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = DistributionConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DistributionError::Config(_))));
    }

    #[test]
    fn test_ratio_out_of_range_rejected() {
        let config = DistributionConfig {
            max_group_failure_ratio: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_policy_parsing() {
        assert_eq!("fail_run".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::FailRun);
        assert_eq!("Reject-Key".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::RejectKey);
        assert!("sum".parse::<DuplicatePolicy>().is_err());
    }

    #[test]
    fn test_duplicate_policy_deserializes_snake_case() {
        let config: DistributionConfig =
            serde_json::from_str(r#"{"duplicate_policy":"fail_run","workers":4}"#).unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::FailRun);
        assert_eq!(config.workers, 4);
        assert!(config.emit_fallback_records);
    }
}
