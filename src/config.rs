//! Layered configuration: TOML file, then `TRACEPULSE__*` environment variables.
//!
//! ```toml
//! [engine]
//! poll_interval = 10      # seconds
//! backfill = 3600         # seconds
//! cycle_timeout = 30      # seconds
//! extended_analyses = false
//!
//! [clickhouse]
//! url = "http://localhost:8123"
//! database = "otel"
//! user = "default"
//! password = ""
//! timeout_secs = 10
//! duration_unit = "ns"
//!
//! [output]
//! path = "analytics.jsonl"
//! log_results = false
//! ```
//!
//! Every key can be overridden from the environment, e.g.
//! `TRACEPULSE__ENGINE__POLL_INTERVAL=5` or `TRACEPULSE__CLICKHOUSE__PASSWORD=...`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use tracepulse_engine::{EngineConfig, EngineError};
use tracepulse_types::DurationUnit;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TRACEPULSE";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub clickhouse: ClickHouseSection,
    pub output: OutputSection,
}

/// Loop timing, in whole seconds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    pub poll_interval: u64,
    pub backfill: u64,
    pub cycle_timeout: u64,
    pub extended_analyses: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            poll_interval: 10,
            backfill: 3600,
            cycle_timeout: 30,
            extended_analyses: false,
        }
    }
}

/// Connection to the trace store.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClickHouseSection {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
    /// Unit of the `Duration` column in `otel_traces`.
    pub duration_unit: DurationUnit,
}

impl Default for ClickHouseSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "otel".to_string(),
            user: "default".to_string(),
            password: String::new(),
            timeout_secs: 10,
            duration_unit: DurationUnit::Nanoseconds,
        }
    }
}

/// Where results go when streaming.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSection {
    /// Append JSON lines here instead of printing to stdout.
    pub path: Option<PathBuf>,
    /// Also emit every result as a log event.
    pub log_results: bool,
}

impl AppConfig {
    /// Load from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment instead of the process one.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// The engine parameters, validated.
    pub fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        let engine = EngineConfig {
            poll_interval: Duration::from_secs(self.engine.poll_interval),
            backfill: Duration::from_secs(self.engine.backfill),
            cycle_timeout: Duration::from_secs(self.engine.cycle_timeout),
            extended_analyses: self.engine.extended_analyses,
        };
        engine.validate()?;
        Ok(engine)
    }

    /// A ClickHouse source built from the `[clickhouse]` section.
    #[cfg(feature = "clickhouse")]
    pub fn clickhouse_source(
        &self,
    ) -> Result<tracepulse_adapters::ClickHouseSource, tracepulse_adapters::SourceError> {
        let ch = &self.clickhouse;
        tracepulse_adapters::ClickHouseSource::builder()
            .endpoint(&ch.url)
            .database(&ch.database)
            .credentials(&ch.user, &ch.password)
            .timeout(Duration::from_secs(ch.timeout_secs))
            .duration_unit(ch.duration_unit)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_with_env(None, Some(HashMap::new())).unwrap();
        assert_eq!(config, AppConfig::default());

        let engine = config.engine_config().unwrap();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file(
            r#"
[engine]
poll_interval = 5
extended_analyses = true

[clickhouse]
url = "http://clickhouse:8123"
duration_unit = "us"

[output]
path = "out.jsonl"
"#,
        );

        let config = AppConfig::load_with_env(Some(file.path()), Some(HashMap::new())).unwrap();
        assert_eq!(config.engine.poll_interval, 5);
        assert_eq!(config.engine.backfill, 3600);
        assert!(config.engine.extended_analyses);
        assert_eq!(config.clickhouse.url, "http://clickhouse:8123");
        assert_eq!(config.clickhouse.database, "otel");
        assert_eq!(config.clickhouse.duration_unit, DurationUnit::Microseconds);
        assert_eq!(config.output.path, Some(PathBuf::from("out.jsonl")));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = toml_file("[engine]\npoll_interval = 5\n");
        let env = HashMap::from([
            ("TRACEPULSE__ENGINE__POLL_INTERVAL".to_string(), "20".to_string()),
            ("TRACEPULSE__CLICKHOUSE__PASSWORD".to_string(), "secret".to_string()),
        ]);

        let config = AppConfig::load_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.engine.poll_interval, 20);
        assert_eq!(config.clickhouse.password, "secret");
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let file = toml_file("[engine]\npoll_interval = 0\n");
        let config = AppConfig::load_with_env(Some(file.path()), Some(HashMap::new())).unwrap();
        assert!(matches!(
            config.engine_config(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AppConfig::load_with_env(
            Some(Path::new("/nonexistent/tracepulse.toml")),
            Some(HashMap::new()),
        );
        assert!(result.is_err());
    }

    #[cfg(feature = "clickhouse")]
    #[test]
    fn test_clickhouse_source_from_section() {
        use tracepulse_adapters::RecordSource;

        let config = AppConfig::default();
        let source = config.clickhouse_source().unwrap();
        assert_eq!(source.description(), "clickhouse: http://localhost:8123/otel");
    }
}
