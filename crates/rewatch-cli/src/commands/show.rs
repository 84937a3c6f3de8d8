use super::{load_config, open_coordinator};
use crate::output::Output;
use crate::report;
use color_eyre::Result;
use serde_json::json;
use watch_stats_config::PathManager;
use watch_stats_core::{Catalog, ResultResponse};
use watch_stats_models::UserId;

pub async fn run_show(path_manager: &PathManager, user: String, profile: String, year: i32, output: &Output) -> Result<()> {
    let config = load_config(path_manager)?;
    // lookups never resolve titles, so the catalog is not needed
    let coordinator = open_coordinator(path_manager, &config, Catalog::empty()).await?;

    let response = coordinator
        .get_result(&UserId::new(user), &profile, year)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to look up {} {}: {}", profile, year, e))?;

    match &response {
        ResultResponse::Ready { data } => {
            if output.is_human() {
                report::print_payload(&format!("{} - {}", profile, year), data);
            }
        }
        ResultResponse::NotFound { message }
        | ResultResponse::Processing { message }
        | ResultResponse::PriorityProcessing { message } => output.warn(message),
    }

    output.json(&json!(response));
    Ok(())
}
