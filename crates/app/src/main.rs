use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Ledger engine with automatic categorization and recurring postings")]
struct Cli {
    /// Settings file, without extension (also read from `TALLY_CONFIG`).
    #[arg(long, env = "TALLY_CONFIG", default_value = "settings")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recurring scheduler until interrupted (default).
    Run,
    /// Run a single processing pass and print the outcome per template.
    ProcessDue {
        /// Reference time in RFC 3339; defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tally={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    let engine = engine::Engine::builder().database(db).build().await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::ProcessDue { at } => {
            let now = at.unwrap_or_else(Utc::now);
            for (recurring_id, outcome) in engine.process_due(now).await? {
                println!("{recurring_id}: {outcome}");
            }
        }
        Command::Run => run_scheduler(engine, &settings.scheduler).await,
    }

    Ok(())
}

/// Runs `process_due` on a fixed interval until ctrl-c.
async fn run_scheduler(engine: engine::Engine, config: &settings::Scheduler) {
    if !config.enabled {
        tracing::info!("Recurring scheduler disabled");
        return;
    }

    let mut tasks: tokio::task::JoinSet<()> = tokio::task::JoinSet::new();
    let period = Duration::from_secs(config.interval_secs);
    tasks.spawn(async move {
        tracing::info!("Starting recurring scheduler every {}s...", period.as_secs());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.process_due(Utc::now()).await {
                Ok(outcomes) if outcomes.is_empty() => {}
                Ok(outcomes) => {
                    tracing::info!("processed {} due templates", outcomes.len());
                }
                Err(err) => tracing::error!("scheduler pass failed: {err}"),
            }
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!("failed to listen for ctrl-c: {err}");
            }
            tracing::info!("Shutting down...");
        }
        _ = async { while tasks.join_next().await.is_some() {} } => {}
    }
    tasks.shutdown().await;
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
