pub mod export;
pub mod process;
pub mod report;

use std::{env, fmt::Display, path::PathBuf};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use export::ExportFormat;
use process::{kill_previous_daemons, restart_daemon};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{self, Config},
    daemon::{
        start_daemon,
        storage::{
            event_store::FsEventStore, migrate::migrate_legacy_log, summary_store::SummaryStore,
        },
        EVENT_DIR_NAME,
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Focuswatch", version, long_about = None)]
#[command(about = "Personal productivity monitor", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Write a default config if none exists and start the daemon")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Show today's work sessions, goal progress and hourly histogram")]
    Today {},
    #[command(about = "Show per-day totals, goal percentage and current streak")]
    Stats {
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Show time spent per project over a date range")]
    Projects {
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Export work sessions for a date range as CSV or JSON")]
    Export {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, default_value_t = ExportFormat::Csv, help = "Output format")]
        format: ExportFormat,
        #[arg(long, short, help = "Write to a file instead of stdout")]
        output: Option<PathBuf>,
    },
    #[command(about = "Import a legacy tab-separated activity log into the event store")]
    Migrate {
        #[arg(help = "Path to the legacy log file")]
        file: PathBuf,
    },
    #[command(about = "Show or edit the configuration")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    #[command(about = "Print the effective configuration")]
    Show {},
    #[command(about = "Set the keyword list attributing activity to a project")]
    SetKeywords {
        project: String,
        #[arg(required = true)]
        keywords: Vec<String>,
    },
    #[command(about = "Remove a project's keyword entry")]
    RemoveKeywords { project: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, clap::Args)]
struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

const DEFAULT_RANGE_DAYS: i64 = 7;

/// Also provides sensible defaults: the last week, ending today. Queries are
/// day-granular, so inputs collapse to the local calendar date they fall on.
fn parse_range(range: RangeArgs) -> Result<(NaiveDate, NaiveDate)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = range.date_style.into();

    let end = match range.end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local).date_naive(),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now.date_naive(),
    };
    let start = match range.start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local).date_naive(),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => end - chrono::Duration::days(DEFAULT_RANGE_DAYS - 1),
    };

    if start > end {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Start date {start} is after end date {end}"),
            )
            .into());
    }
    Ok((start, end))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = create_application_default_path()?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init { dir } => {
            let app_dir = dir.unwrap_or(app_dir);
            ensure_config(&app_dir)?;
            restart_daemon()?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe()?;
            kill_previous_daemons(&process_name);
            Ok(())
        }
        Commands::Serve { dir } => {
            start_daemon(dir.unwrap_or(app_dir)).await?;
            Ok(())
        }
        Commands::Today {} => {
            let (config, store, summaries) = open_data(&app_dir)?;
            report::show_today(store, &summaries, &config).await
        }
        Commands::Stats { range } => {
            let (start, end) = parse_range(range)?;
            let (config, store, summaries) = open_data(&app_dir)?;
            report::show_stats(store, &summaries, &config, start, end).await
        }
        Commands::Projects { range } => {
            let (start, end) = parse_range(range)?;
            let (config, store, _) = open_data(&app_dir)?;
            report::show_projects(store, &config, start, end).await
        }
        Commands::Export {
            range,
            format,
            output,
        } => {
            let (start, end) = parse_range(range)?;
            let (config, store, _) = open_data(&app_dir)?;
            let days = report::collect_range(store, &config, start, end).await;
            export::write_export(&days, &config, format, output)
        }
        Commands::Config { action } => {
            let path = config::config_path(&app_dir);
            let mut config = config::load_config(&path)?;
            match action {
                ConfigAction::Show {} => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                ConfigAction::SetKeywords { project, keywords } => {
                    config.project_keywords.set(&project, keywords);
                    config::save_config(&path, &config)?;
                    // A running daemon notices the new file mtime on its next
                    // classification.
                    println!("Updated keywords for {project}");
                }
                ConfigAction::RemoveKeywords { project } => {
                    config.project_keywords.remove(&project);
                    config::save_config(&path, &config)?;
                    println!("Removed keywords for {project}");
                }
            }
            Ok(())
        }
        Commands::Migrate { file } => {
            let (config, store, _) = open_data(&app_dir)?;
            let report = migrate_legacy_log(&store, &file, &config.project_keywords).await?;
            println!(
                "Migrated {} event(s), skipped {} unparsable line(s)",
                report.migrated, report.skipped
            );
            Ok(())
        }
    }
}

fn open_data(app_dir: &std::path::Path) -> Result<(Config, FsEventStore, SummaryStore)> {
    let config = config::load_config(&config::config_path(app_dir))?;
    let store = FsEventStore::new(app_dir.join(EVENT_DIR_NAME))?;
    let summaries = SummaryStore::new(app_dir);
    Ok((config, store, summaries))
}

/// First-run setup. An existing config is left untouched.
fn ensure_config(app_dir: &std::path::Path) -> Result<()> {
    let path = config::config_path(app_dir);
    if !path.exists() {
        config::save_config(&path, &Config::default())?;
        println!("Wrote default config to {}", path.display());
    }
    Ok(())
}
