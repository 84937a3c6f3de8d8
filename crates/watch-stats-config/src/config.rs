use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What to do with a row whose timestamp or duration cannot be parsed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorPolicy {
    /// Drop the row and keep going with the rest of the batch
    #[default]
    Skip,
    /// Fail the whole batch on the first bad row
    Abort,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid row error policy: {0}. Use 'skip' or 'abort'")]
pub struct InvalidPolicy(String);

impl FromStr for RowErrorPolicy {
    type Err = InvalidPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(RowErrorPolicy::Skip),
            "abort" => Ok(RowErrorPolicy::Abort),
            _ => Err(InvalidPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Reference title catalog (CSV with title, type and rating columns).
    /// Falls back to the data directory when unset.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub row_error_policy: RowErrorPolicy,
    #[serde(default = "default_top_titles")]
    pub top_titles: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            row_error_policy: RowErrorPolicy::default(),
            top_titles: default_top_titles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long an upload's raw rows stay available for priority requests
    #[serde(default = "default_job_data_ttl_secs")]
    pub job_data_ttl_secs: u64,
    /// How long a finished job's status stays queryable
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
}

impl JobsConfig {
    pub fn job_data_ttl(&self) -> Duration {
        Duration::from_secs(self.job_data_ttl_secs)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            job_data_ttl_secs: default_job_data_ttl_secs(),
            status_ttl_secs: default_status_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json_logging")]
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json_logging(),
            file: None,
        }
    }
}

fn default_top_titles() -> usize {
    10
}

fn default_job_data_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_status_ttl_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logging() -> bool {
    use std::io::IsTerminal;
    !std::io::stdout().is_terminal()
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.analytics.top_titles == 0 {
            return Err(anyhow::anyhow!("analytics.top_titles must be at least 1"));
        }

        if self.jobs.job_data_ttl_secs == 0 {
            return Err(anyhow::anyhow!("jobs.job_data_ttl_secs must be greater than zero"));
        }

        if self.jobs.status_ttl_secs == 0 {
            return Err(anyhow::anyhow!("jobs.status_ttl_secs must be greater than zero"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!("Invalid logging.level: {}", self.logging.level));
        }

        if let Some(ref catalog) = self.analytics.catalog_path {
            if catalog.as_os_str().is_empty() {
                return Err(anyhow::anyhow!("analytics.catalog_path cannot be empty"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let config = Config {
            analytics: AnalyticsConfig {
                catalog_path: Some(PathBuf::from("/tmp/titles.csv")),
                row_error_policy: RowErrorPolicy::Abort,
                top_titles: 5,
            },
            jobs: JobsConfig {
                job_data_ttl_secs: 60,
                status_ttl_secs: 120,
            },
            logging: LoggingConfig::default(),
        };

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.analytics.catalog_path, Some(PathBuf::from("/tmp/titles.csv")));
        assert_eq!(loaded.analytics.row_error_policy, RowErrorPolicy::Abort);
        assert_eq!(loaded.analytics.top_titles, 5);
        assert_eq!(loaded.jobs.job_data_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analytics.row_error_policy, RowErrorPolicy::Skip);
        assert_eq!(config.analytics.top_titles, 10);
        assert_eq!(config.jobs.job_data_ttl_secs, 1800);
        assert_eq!(config.jobs.status_ttl_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section() {
        let config: Config = toml::from_str("[analytics]\nrow_error_policy = \"abort\"\n").unwrap();
        assert_eq!(config.analytics.row_error_policy, RowErrorPolicy::Abort);
        assert_eq!(config.analytics.top_titles, 10);
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        config.analytics.top_titles = 0;
        assert!(config.validate().is_err());

        config.analytics.top_titles = 10;
        config.jobs.job_data_ttl_secs = 0;
        assert!(config.validate().is_err());

        config.jobs.job_data_ttl_secs = 30;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_row_error_policy_from_str() {
        assert_eq!("skip".parse::<RowErrorPolicy>().unwrap(), RowErrorPolicy::Skip);
        assert_eq!("ABORT".parse::<RowErrorPolicy>().unwrap(), RowErrorPolicy::Abort);
        assert!("retry".parse::<RowErrorPolicy>().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.analytics.top_titles, 10);
    }
}
