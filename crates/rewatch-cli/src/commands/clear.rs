use crate::output::Output;
use color_eyre::Result;
use std::fs;
use watch_stats_config::PathManager;
use watch_stats_core::{JsonFileResultStore, ResultStore};

pub async fn run_clear(path_manager: &PathManager, all: bool, results: bool, logs: bool, output: &Output) -> Result<()> {
    if !(all || results || logs) {
        output.warn("No clear option specified. Use --results, --logs, or --all");
        output.info("\nExample: rewatch clear --results");
        return Ok(());
    }

    if all || results {
        clear_results(path_manager, output).await?;
    }

    if all || logs {
        clear_logs(path_manager, output)?;
    }

    if all {
        output.success("All stored results and logs cleared");
    }
    Ok(())
}

async fn clear_results(path_manager: &PathManager, output: &Output) -> Result<()> {
    let results_file = path_manager.results_file();
    if !results_file.exists() {
        output.info("No stored results found to clear");
        return Ok(());
    }

    let store = JsonFileResultStore::open(&results_file)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to open results at {}: {}", results_file.display(), e))?;
    let removed = store
        .clear()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to clear results: {}", e))?;

    output.success(format!("Cleared {} stored result(s) from {}", removed, results_file.display()));
    Ok(())
}

fn clear_logs(path_manager: &PathManager, output: &Output) -> Result<()> {
    let log_dir = path_manager.log_dir();
    if !log_dir.exists() {
        output.info("No log directory found to clear");
        return Ok(());
    }

    fs::remove_dir_all(log_dir)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to remove log directory at {}: {}", log_dir.display(), e))?;
    fs::create_dir_all(log_dir)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to recreate log directory at {}: {}", log_dir.display(), e))?;

    output.success(format!("Cleared logs: {}", log_dir.display()));
    Ok(())
}
