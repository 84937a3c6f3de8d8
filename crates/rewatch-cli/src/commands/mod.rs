pub mod analyze;
pub mod clear;
pub mod config;
pub mod list;
pub mod show;

use crate::output::Output;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use watch_stats_config::{Config, PathManager};
use watch_stats_core::{Catalog, Coordinator, CoordinatorOptions, InMemoryCache, JsonFileResultStore};

/// Load and validate the configuration, falling back to defaults when no file exists.
pub fn load_config(path_manager: &PathManager) -> Result<Config> {
    let config_file = path_manager.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

/// A missing catalog is not fatal: every title then resolves to "Unknown".
pub fn load_catalog(path_manager: &PathManager, config: &Config, override_path: Option<PathBuf>, output: &Output) -> Result<Catalog> {
    let path = override_path
        .or_else(|| config.analytics.catalog_path.clone())
        .unwrap_or_else(|| path_manager.catalog_file());

    if !path.exists() {
        output.warn(format!(
            "Title catalog not found at {}. Media types and ratings will be reported as Unknown.",
            path.display()
        ));
        return Ok(Catalog::empty());
    }

    Catalog::load(&path).map_err(|e| color_eyre::eyre::eyre!("Failed to load catalog from {}: {}", path.display(), e))
}

/// Coordinator backed by the results file, with an in-process cache for upload data.
pub async fn open_coordinator(path_manager: &PathManager, config: &Config, catalog: Catalog) -> Result<Coordinator> {
    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create data directories: {}", e))?;

    let results_file = path_manager.results_file();
    let store = JsonFileResultStore::open(&results_file)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to open results at {}: {}", results_file.display(), e))?;

    Ok(Coordinator::new(
        Arc::new(store),
        Arc::new(InMemoryCache::new()),
        Arc::new(catalog),
        CoordinatorOptions::from(config),
    ))
}
