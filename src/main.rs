use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use nutrient_tracker::config::TrackerConfig;
use nutrient_tracker::db::PgStore;
use nutrient_tracker::record_types::Sex;
use nutrient_tracker::store::{MemoryStore, RecordStore};
use nutrient_tracker::summary::Timeframe;
use nutrient_tracker::tracker::{DashboardRequest, NutritionTracker};

#[derive(Parser)]
#[command(
    name = "nutrient-tracker",
    about = "Nutrient intake tracking against RDI targets"
)]
struct Cli {
    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Intake summary for one day
    Daily {
        /// Day to summarize (YYYY-MM-DD), today in the user's timezone by default
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Intake summary for the seven days ending on a day
    Weekly {
        /// Last day of the window (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Totals of a recipe
    Recipe {
        id: i64,
        /// Recompute even if cached totals exist
        #[arg(long)]
        force: bool,
    },
    /// Convert a quantity between units
    Convert {
        value: f64,
        from: String,
        to: String,
        /// Ingredient for ingredient-specific conversions
        #[arg(long)]
        ingredient: Option<String>,
    },
    /// Drop the cached totals of a recipe
    Invalidate { id: i64 },
}

#[derive(clap::Args)]
struct TargetArgs {
    #[arg(long)]
    user: Option<i64>,
    /// Sex used to pick targets (male or female)
    #[arg(long)]
    sex: Option<Sex>,
    #[arg(long)]
    age: Option<u32>,
}

#[derive(Serialize)]
struct ConversionOutput<'a> {
    value: f64,
    from: &'a str,
    to: &'a str,
    converted: Option<f64>,
    strategy: Option<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let json = std::env::var("NUTRIENT_LOG_JSON").is_ok_and(|value| value == "1");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).compact().init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn dashboard_request(timeframe: Timeframe, date: Option<NaiveDate>, target: TargetArgs) -> DashboardRequest {
    DashboardRequest {
        timeframe,
        date,
        user_id: target.user,
        sex: target.sex,
        age: target.age,
    }
}

async fn run<S: RecordStore + ?Sized>(tracker: NutritionTracker<S>, command: Command) -> Result<()> {
    match command {
        Command::Daily { date, target } => {
            let report = tracker
                .dashboard(&dashboard_request(Timeframe::Daily, date, target))
                .await?;
            print_json(&report)
        }
        Command::Weekly { end, target } => {
            let report = tracker
                .dashboard(&dashboard_request(Timeframe::Weekly, end, target))
                .await?;
            print_json(&report)
        }
        Command::Recipe { id, force } => {
            let totals = tracker.recipes().ensure_totals(id, force).await?;
            print_json(&totals)
        }
        Command::Convert {
            value,
            from,
            to,
            ingredient,
        } => {
            let conversion = tracker
                .convert(value, Some(&from), Some(&to), ingredient.as_deref())
                .await;
            print_json(&ConversionOutput {
                value,
                from: &from,
                to: &to,
                converted: conversion.map(|c| c.value),
                strategy: conversion.map(|c| format!("{:?}", c.strategy)),
            })
        }
        Command::Invalidate { id } => {
            tracker.recipes().invalidate(id).await?;
            info!("Invalidated cached totals of recipe {}", id);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = TrackerConfig::from_env()?;
    if cli.database_url.is_some() {
        config.database_url = cli.database_url;
    }

    match config.database_url.clone() {
        Some(database_url) => {
            info!("Using PostgreSQL record store");
            let store = Arc::new(PgStore::connect(&database_url).await?);
            run(NutritionTracker::new(store, config), cli.command).await
        }
        None => {
            info!("DATABASE_URL not set, using an empty in-memory record store");
            let store = Arc::new(MemoryStore::new());
            run(NutritionTracker::new(store, config), cli.command).await
        }
    }
}
