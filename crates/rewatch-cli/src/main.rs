use clap::{ArgAction, Parser, Subcommand};
use commands::{analyze, clear, config, list, show};
use watch_stats_config::{Config, PathManager, RowErrorPolicy};

mod commands;
mod logging;
mod output;
mod report;

#[derive(Parser)]
#[command(name = "rewatch")]
#[command(about = "Rewatch - Yearly analytics for your streaming viewing history")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a viewing activity export
    #[command(long_about = "Read a ViewingActivity.csv export, split it into (profile, year) units and compute analytics for every unit. Units requested with --priority are computed first and printed as soon as they are ready.")]
    Analyze {
        /// Path to the ViewingActivity.csv export
        #[arg(value_name = "CSV")]
        file: std::path::PathBuf,

        /// Account the results are stored under
        #[arg(long)]
        user: String,

        /// Compute this unit ahead of the queue (repeatable), e.g. --priority "Alice:2023"
        #[arg(long, value_name = "PROFILE:YEAR")]
        priority: Vec<String>,

        /// Reference title catalog (overrides analytics.catalog_path)
        #[arg(long, value_name = "PATH")]
        catalog: Option<std::path::PathBuf>,

        /// Malformed row handling for this run, `skip` or `abort` (overrides analytics.row_error_policy)
        #[arg(long, value_name = "POLICY")]
        row_errors: Option<RowErrorPolicy>,
    },
    /// Show stored analytics for one profile and year
    Show {
        #[arg(long)]
        user: String,

        #[arg(long)]
        profile: String,

        #[arg(long)]
        year: i32,
    },
    /// List profiles and years with stored analytics
    List {
        #[arg(long)]
        user: String,
    },
    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Clear stored results and logs
    #[command(long_about = "Clear stored analytics or log files. Use --results to drop every stored result, --logs to delete log files, or --all for both.")]
    Clear {
        /// Clear results and logs
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,

        /// Clear stored analytics results
        #[arg(long, action = ArgAction::SetTrue)]
        results: bool,

        /// Clear log files
        #[arg(long, action = ArgAction::SetTrue)]
        logs: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let path_manager = PathManager::default();
    // Logging comes up before the config is validated, so a broken file still gets reported
    let logging_config = Config::load_or_default(&path_manager.config_file())
        .map(|c| c.logging)
        .unwrap_or_default();
    logging::init_logging(cli.verbose, cli.quiet, &logging_config).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Analyze {
            file,
            user,
            priority,
            catalog,
            row_errors,
        } => analyze::run_analyze(&path_manager, file, user, priority, catalog, row_errors, &output).await,
        Commands::Show { user, profile, year } => show::run_show(&path_manager, user, profile, year, &output).await,
        Commands::List { user } => list::run_list(&path_manager, user, &output).await,
        Commands::Config { cmd } => config::run_config(&path_manager, cmd, &output).await,
        Commands::Clear { all, results, logs } => clear::run_clear(&path_manager, all, results, logs, &output).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_row_errors_override() {
        let cli = Cli::try_parse_from(["rewatch", "analyze", "export.csv", "--user", "me", "--row-errors", "abort"]).unwrap();
        let Commands::Analyze { row_errors, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(row_errors, Some(RowErrorPolicy::Abort));

        let cli = Cli::try_parse_from(["rewatch", "analyze", "export.csv", "--user", "me"]).unwrap();
        let Commands::Analyze { row_errors, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(row_errors, None);

        assert!(Cli::try_parse_from(["rewatch", "analyze", "export.csv", "--user", "me", "--row-errors", "retry"]).is_err());
    }
}
