//! innostat - MySQL metric poller
//!
//! Polls `INNODB_METRICS` and `GLOBAL_STATUS` on a fixed cadence and records
//! every new observation in a local SQLite database.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use innostat::{ConfigOverrides, MySqlSource, PollConfig};
use innostat_core::{MetricStore, Poller, UnresolvedPolicy};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "innostat")]
#[command(about = "Polls MySQL InnoDB metrics and global status into SQLite")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to a TOML config file
    #[arg(short, long, env = "INNOSTAT_CONFIG")]
    config: Option<PathBuf>,

    /// MySQL URL of the monitored server
    #[arg(long, env = "INNOSTAT_DSN")]
    dsn: Option<String>,

    /// How long to sleep between two consecutive polls (e.g. 1s, 500ms)
    #[arg(long, env = "INNOSTAT_INTERVAL", value_parser = humantime::parse_duration)]
    sleep: Option<Duration>,

    /// Also output the metrics in JSON format
    #[arg(long, env = "INNOSTAT_JSON")]
    json: bool,

    /// Path of the SQLite database
    #[arg(long, env = "INNOSTAT_DATABASE")]
    database: Option<PathBuf>,

    /// What to do with metrics that appear after startup: register or skip
    #[arg(long)]
    unresolved: Option<UnresolvedPolicy>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            dsn: self.dsn.clone(),
            interval: self.sleep,
            json: self.json.then_some(true),
            database: self.database.clone(),
            unresolved: self.unresolved,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller (default)
    Run,

    /// Generate a sample config file
    InitConfig {
        /// Path to write config (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for the JSON echo.
    let filter = EnvFilter::from_default_env()
        .add_directive("innostat=info".parse()?)
        .add_directive("innostat_core=info".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.log_json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!cli.log_json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = PollConfig::resolve(cli.run.config.as_deref(), cli.run.overrides())?;
            if let Err(e) = run_poller(config).await {
                error!(error = %format!("{e:#}"), "fatal");
                return Err(e);
            }
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

async fn run_poller(config: PollConfig) -> anyhow::Result<()> {
    info!(
        dsn = %config.redacted_dsn(),
        database = %config.database.display(),
        interval = %humantime::format_duration(config.interval),
        json = config.json,
        "starting innostat"
    );

    let store = MetricStore::open(&config.database)
        .with_context(|| format!("failed to open {}", config.database.display()))?;
    let source = MySqlSource::connect(&config.dsn)
        .await
        .context("failed to connect to mysql")?;

    let mut poller = Poller::new(source, store, config.poller_options());
    poller.run().await.context("polling stopped")?;
    Ok(())
}

fn init_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(&PollConfig::default())?;
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote sample config to {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}
