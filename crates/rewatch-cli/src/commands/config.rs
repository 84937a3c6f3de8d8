use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use serde_json::json;
use watch_stats_config::{Config, PathManager};

pub async fn run_config(path_manager: &PathManager, cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show_config(path_manager, output),
        ConfigCommands::Init { force } => init_config(path_manager, force, output),
    }
}

fn show_config(path_manager: &PathManager, output: &Output) -> Result<()> {
    let config_file = path_manager.config_file();
    let exists = config_file.exists();
    let config = super::load_config(path_manager)?;

    if !exists {
        output.warn(format!(
            "Configuration file not found at {}; showing defaults. Run 'rewatch config init' to create it.",
            config_file.display()
        ));
    }

    if output.is_human() {
        println!("\n{}", "Configuration".bright_cyan().bold());

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Setting").add_attribute(comfy_table::Attribute::Bold),
            Cell::new("Value").add_attribute(comfy_table::Attribute::Bold),
        ]);
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

        let catalog = config
            .analytics
            .catalog_path
            .clone()
            .unwrap_or_else(|| path_manager.catalog_file());
        let rows = [
            ("Config file", config_file.display().to_string()),
            ("Results file", path_manager.results_file().display().to_string()),
            ("analytics.catalog_path", catalog.display().to_string()),
            ("analytics.row_error_policy", format!("{:?}", config.analytics.row_error_policy).to_lowercase()),
            ("analytics.top_titles", config.analytics.top_titles.to_string()),
            ("jobs.job_data_ttl_secs", config.jobs.job_data_ttl_secs.to_string()),
            ("jobs.status_ttl_secs", config.jobs.status_ttl_secs.to_string()),
            ("logging.level", config.logging.level.clone()),
            ("logging.json", config.logging.json.to_string()),
            (
                "logging.file",
                config
                    .logging
                    .file
                    .as_ref()
                    .map(|f| f.display().to_string())
                    .unwrap_or_else(|| "stderr".to_string()),
            ),
        ];
        for (key, value) in rows {
            table.add_row(vec![Cell::new(key), Cell::new(value)]);
        }
        println!("{}", table);
    }

    let as_toml = toml::to_string(&config).map_err(|e| color_eyre::eyre::eyre!("Failed to serialize config: {}", e))?;
    output.json(&json!({
        "config_file": config_file.display().to_string(),
        "exists": exists,
        "config": as_toml,
    }));
    Ok(())
}

fn init_config(path_manager: &PathManager, force: bool, output: &Output) -> Result<()> {
    let config_file = path_manager.config_file();
    if config_file.exists() && !force {
        output.warn(format!(
            "Configuration already exists at {}. Use --force to overwrite it.",
            config_file.display()
        ));
        return Ok(());
    }

    let mut config = Config::default();
    config.logging.file = Some(path_manager.log_file());
    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to write config to {}: {}", config_file.display(), e))?;

    output.success(format!("Wrote default configuration to {}", config_file.display()));
    Ok(())
}
