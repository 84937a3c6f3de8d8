pub mod config;
pub mod paths;

pub use config::{AnalyticsConfig, Config, JobsConfig, LoggingConfig, RowErrorPolicy};
pub use paths::{PathManager, container_base_path};
