use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cykel_engine::{backup, build_all, build_report, Config, CycleReport};

/// Print cycle predictions, fertility windows and statistics from a backup file.
#[derive(Parser, Debug)]
#[command(name = "cykel-report", version)]
struct Cli {
    /// Backup file holding every user's history (JSON)
    #[arg(long, short = 'd')]
    data: PathBuf,

    /// Only report these users (repeatable; default: all users)
    #[arg(long = "user", short = 'u')]
    users: Vec<String>,

    /// Evaluate as of this date (YYYY-MM-DD) instead of today
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Config file (default: <config dir>/cykel/config.toml)
    #[arg(long, env = "CYKEL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when CYKEL_LOG is not set
    #[arg(long, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    log_level: String,

    /// Print single-line JSON
    #[arg(long)]
    compact: bool,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("CYKEL_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    let data = backup::read_backup(&cli.data)
        .with_context(|| format!("failed to read {}", cli.data.display()))?;
    let today = cli
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let results = if cli.users.is_empty() {
        build_all(&data, today, &config.report)
    } else {
        cli.users
            .iter()
            .map(|user| {
                let report = build_report(data.user(user), today, &config.report);
                (user.clone(), report)
            })
            .collect()
    };

    let mut reports: BTreeMap<String, CycleReport> = BTreeMap::new();
    let mut failed = false;
    for (user, result) in results {
        match result {
            Ok(report) => {
                reports.insert(user, report);
            }
            Err(err) => {
                warn!(%user, error = %err, "skipping user with invalid history");
                failed = true;
            }
        }
    }

    let json = if cli.compact {
        serde_json::to_string(&reports)?
    } else {
        serde_json::to_string_pretty(&reports)?
    };
    println!("{json}");

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
