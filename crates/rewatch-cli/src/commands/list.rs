use super::{load_config, open_coordinator};
use crate::output::Output;
use crate::report;
use color_eyre::Result;
use serde_json::json;
use watch_stats_config::PathManager;
use watch_stats_core::Catalog;
use watch_stats_models::UserId;

pub async fn run_list(path_manager: &PathManager, user: String, output: &Output) -> Result<()> {
    let config = load_config(path_manager)?;
    let coordinator = open_coordinator(path_manager, &config, Catalog::empty()).await?;

    let user = UserId::new(user);
    let stored = coordinator
        .list_stored(&user)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to list stored results: {}", e))?;

    if stored.is_empty() {
        output.info(format!("No stored analytics for {}", user));
    } else if output.is_human() {
        report::print_stored(&stored);
    }

    output.json(&json!({ "user": user, "stored": stored }));
    Ok(())
}
