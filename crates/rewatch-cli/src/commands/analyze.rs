use super::{load_catalog, load_config, open_coordinator};
use crate::output::Output;
use crate::report;
use color_eyre::Result;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use watch_stats_config::{PathManager, RowErrorPolicy};
use watch_stats_core::{read_export_file, Coordinator, PriorityResponse};
use watch_stats_models::{JobId, JobStatus, UserId, WorkUnit};

pub async fn run_analyze(
    path_manager: &PathManager,
    file: PathBuf,
    user: String,
    priority: Vec<String>,
    catalog: Option<PathBuf>,
    row_errors: Option<RowErrorPolicy>,
    output: &Output,
) -> Result<()> {
    tracing::debug!("Analyze command started");

    let priority_units = priority
        .iter()
        .map(|value| parse_unit(value))
        .collect::<Result<Vec<_>>>()?;

    let mut config = load_config(path_manager)?;
    if let Some(policy) = row_errors {
        tracing::debug!(?policy, "Overriding row error policy");
        config.analytics.row_error_policy = policy;
    }
    let catalog = load_catalog(path_manager, &config, catalog, output)?;
    let coordinator = open_coordinator(path_manager, &config, catalog).await?;

    let export = read_export_file(&file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read {}: {}", file.display(), e))?;
    output.info(format!("Read {} rows from {}", export.len(), file.display()));

    let submission = coordinator
        .submit_upload(export, UserId::new(user))
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Upload rejected: {}", e))?;

    output.success(format!("{} (job {})", submission.message, submission.job_id));
    if output.is_human() {
        report::print_profile_years(&submission.profile_years, &submission.yearly_watchtime);
    }

    // Priority units are computed concurrently while the background job is paused
    let priority_results = join_all(
        priority_units
            .iter()
            .map(|unit| coordinator.priority_process(&submission.job_id, &unit.profile_name, unit.year)),
    )
    .await;

    let mut priority_json = Vec::new();
    for (unit, result) in priority_units.iter().zip(priority_results) {
        let response = PriorityResponse::from(result);
        match &response {
            PriorityResponse::Ready { data } => {
                if output.is_human() {
                    report::print_payload(&format!("Priority: {}", unit), data);
                }
            }
            PriorityResponse::Error { message } => output.error(format!("Priority {} failed: {}", unit, message)),
        }
        priority_json.push(json!({ "unit": unit.to_string(), "result": response }));
    }

    let status = wait_for_completion(&coordinator, &submission.job_id, output).await?;
    let report = coordinator.job_status(&submission.job_id).await;
    let metrics = coordinator.metrics();

    match status {
        JobStatus::Completed => output.success(&report.message),
        _ => output.error(format!(
            "{}: {}",
            report.message,
            report.error.as_deref().unwrap_or("unknown error")
        )),
    }

    output.json(&json!({
        "submission": submission,
        "priority": priority_json,
        "job": report,
        "metrics": metrics,
    }));

    if status == JobStatus::Error {
        return Err(color_eyre::eyre::eyre!("Job {} failed", submission.job_id));
    }
    Ok(())
}

/// `PROFILE:YEAR`; the profile may itself contain colons.
fn parse_unit(value: &str) -> Result<WorkUnit> {
    let (profile, year) = value
        .rsplit_once(':')
        .ok_or_else(|| color_eyre::eyre::eyre!("Invalid priority '{}', expected PROFILE:YEAR", value))?;
    let year = year
        .trim()
        .parse::<i32>()
        .map_err(|_| color_eyre::eyre::eyre!("Invalid year in priority '{}'", value))?;

    let profile = profile.trim();
    if profile.is_empty() {
        return Err(color_eyre::eyre::eyre!("Missing profile in priority '{}'", value));
    }
    Ok(WorkUnit::new(profile, year))
}

async fn wait_for_completion(coordinator: &Coordinator, job_id: &JobId, output: &Output) -> Result<JobStatus> {
    let interactive = output.is_human() && std::io::stdout().is_terminal();

    let spinner = if interactive {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .map_err(|e| color_eyre::eyre::eyre!("Invalid progress template: {}", e))?
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    } else {
        tracing::info!(operation = "analyze", job_id = %job_id, "Waiting for background processing");
        None
    };

    let waiter = coordinator.wait_for_job(job_id);
    tokio::pin!(waiter);

    let status = loop {
        tokio::select! {
            status = &mut waiter => break status,
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if let Some(spinner) = &spinner {
                    let report = coordinator.job_status(job_id).await;
                    if let Some(progress) = report.progress {
                        spinner.set_message(format!("Processing units {}/{}", progress.processed, progress.total));
                    }
                }
            }
        }
    };

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    status.map_err(|e| color_eyre::eyre::eyre!("Lost track of job {}: {}", job_id, e))
}
