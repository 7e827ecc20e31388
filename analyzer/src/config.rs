use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::profile_analyzer::models::constants::DEFAULT_TIME_METRIC;
use crate::profile_analyzer::{ContributorConfig, Reducer};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Defaults for host reports and contributor ranking
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Counter holding node wall-clock time (default: TotalTime)
    pub time_metric: String,
    /// Rank contributors by the averaged instance (default: true)
    pub use_averaged: bool,
    /// Reducer over per-host times when `use_averaged` is false (default: "max")
    pub contributor_reducer: String,
    /// Reducers for host reports, e.g. ["max", "mean"] (default: ["max"])
    pub host_reducers: Vec<String>,
    /// Maximum contributors reported (default: 10)
    pub max_contributors: usize,
    /// Minimum impact in [0, 1] for a contributor to be reported (default: 0.05)
    pub min_impact: f64,
}

impl Config {
    /// Load configuration with environment variable override support
    ///
    /// Loading order:
    /// 1. Load from the given path, or the first config.toml found
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load(path: Option<&str>) -> Result<Self, anyhow::Error> {
        // 1. Load from config file
        let mut config = match path.map(str::to_string).or_else(Self::find_config_file) {
            Some(config_path) => Self::from_toml(&config_path)?,
            None => {
                tracing::warn!("Configuration file not found, using defaults");
                Config::default()
            },
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,query_profile_analyzer=debug")
    /// - APP_LOG_FILE: Log file path; empty disables file logging
    /// - APP_TIME_METRIC: Counter used as node wall-clock time
    /// - APP_USE_AVERAGED: Rank contributors by averaged instances (true/false)
    /// - APP_CONTRIBUTOR_REDUCER: Reducer over per-host contributor times
    /// - APP_HOST_REDUCERS: Comma separated reducers (e.g., "max,mean")
    /// - APP_MAX_CONTRIBUTORS: Maximum contributors reported
    /// - APP_MIN_IMPACT: Minimum contributor impact
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(file) = std::env::var("APP_LOG_FILE") {
            self.logging.file = if file.is_empty() { None } else { Some(file) };
            tracing::info!("Override logging.file from env: {:?}", self.logging.file);
        }

        if let Ok(metric) = std::env::var("APP_TIME_METRIC") {
            self.analysis.time_metric = metric;
            tracing::info!("Override analysis.time_metric from env: {}", self.analysis.time_metric);
        }

        if let Ok(averaged) = std::env::var("APP_USE_AVERAGED")
            && let Ok(val) = averaged.parse()
        {
            self.analysis.use_averaged = val;
            tracing::info!("Override analysis.use_averaged from env: {}", self.analysis.use_averaged);
        }

        if let Ok(reducer) = std::env::var("APP_CONTRIBUTOR_REDUCER") {
            self.analysis.contributor_reducer = reducer;
            tracing::info!(
                "Override analysis.contributor_reducer from env: {}",
                self.analysis.contributor_reducer
            );
        }

        if let Ok(reducers) = std::env::var("APP_HOST_REDUCERS") {
            self.analysis.host_reducers = reducers.split(',').map(|r| r.trim().to_string()).collect();
            tracing::info!("Override analysis.host_reducers from env: {:?}", self.analysis.host_reducers);
        }

        if let Ok(max) = std::env::var("APP_MAX_CONTRIBUTORS") {
            match max.parse() {
                Ok(val) => {
                    self.analysis.max_contributors = val;
                    tracing::info!(
                        "Override analysis.max_contributors from env: {}",
                        self.analysis.max_contributors
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_MAX_CONTRIBUTORS '{}': {} (keep {})",
                    max,
                    e,
                    self.analysis.max_contributors
                ),
            }
        }

        if let Ok(impact) = std::env::var("APP_MIN_IMPACT") {
            match impact.parse() {
                Ok(val) => {
                    self.analysis.min_impact = val;
                    tracing::info!("Override analysis.min_impact from env: {}", self.analysis.min_impact);
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_MIN_IMPACT '{}': {} (keep {})",
                    impact,
                    e,
                    self.analysis.min_impact
                ),
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.analysis.time_metric.is_empty() {
            anyhow::bail!("analysis.time_metric cannot be empty");
        }

        if !(0.0..=1.0).contains(&self.analysis.min_impact) {
            anyhow::bail!("analysis.min_impact must be within [0, 1]");
        }

        if self.analysis.max_contributors == 0 {
            anyhow::bail!("analysis.max_contributors must be > 0");
        }

        self.analysis.reducers()?;
        self.analysis.contributor_config()?;

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl AnalysisConfig {
    /// Parsed host report reducers
    pub fn reducers(&self) -> Result<Vec<Reducer>, anyhow::Error> {
        if self.host_reducers.is_empty() {
            anyhow::bail!("analysis.host_reducers cannot be empty");
        }
        self.host_reducers
            .iter()
            .map(|r| r.parse::<Reducer>().map_err(anyhow::Error::msg))
            .collect()
    }

    pub fn contributor_config(&self) -> Result<ContributorConfig, anyhow::Error> {
        let reducer = self
            .contributor_reducer
            .parse::<Reducer>()
            .map_err(|e| anyhow::anyhow!("analysis.contributor_reducer: {}", e))?;
        Ok(ContributorConfig {
            time_metric: self.time_metric.clone(),
            use_averaged: self.use_averaged,
            reducer,
            max_contributors: self.max_contributors,
            min_impact: self.min_impact,
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,query_profile_analyzer=debug".to_string(), file: None }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_metric: DEFAULT_TIME_METRIC.to_string(),
            use_averaged: true,
            contributor_reducer: "max".to_string(),
            host_reducers: vec!["max".to_string()],
            max_contributors: 10,
            min_impact: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.reducers().unwrap(), vec![Reducer::Max]);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [logging]
            level = "warn"
            file = "logs/analyzer.log"

            [analysis]
            time_metric = "LocalTime"
            use_averaged = false
            contributor_reducer = "mean"
            host_reducers = ["max", "avg"]
            max_contributors = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.file.as_deref(), Some("logs/analyzer.log"));
        assert_eq!(config.analysis.time_metric, "LocalTime");
        assert_eq!(config.analysis.reducers().unwrap(), vec![Reducer::Max, Reducer::Mean]);
        // Unset keys keep their defaults
        assert_eq!(config.analysis.min_impact, 0.05);

        let contributor = config.analysis.contributor_config().unwrap();
        assert_eq!(contributor.time_metric, "LocalTime");
        assert!(!contributor.use_averaged);
        assert_eq!(contributor.reducer, Reducer::Mean);
        assert_eq!(contributor.max_contributors, 3);
        assert_eq!(contributor.min_impact, 0.05);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.analysis.min_impact = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.host_reducers = vec!["median".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.contributor_reducer = "p99".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.max_contributors = 0;
        assert!(config.validate().is_err());
    }
}
