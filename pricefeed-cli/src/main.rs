//! pricefeed CLI: backfill, predict and status commands.
//!
//! Commands:
//! - `backfill`: fetch the trailing window of prices into the local store
//! - `predict`: fit a linear trend over the stored series and project it
//! - `status`: report how many observations are stored and their date range

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pricefeed_core::data::{
    BackfillWindow, Ingestor, LogProgress, MarketDataClient, PriceStore, ThreadSleeper,
};
use pricefeed_core::trend::{project, Projection, TrendModel};
use pricefeed_core::FeedConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pricefeed",
    about = "pricefeed: historical price backfill and trend projection"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the store path from the config.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill the trailing window of prices into the store.
    Backfill {
        /// Override the number of days to look back.
        #[arg(long)]
        days: Option<u32>,

        /// Skip all cooldown waits (for local testing against a mock upstream).
        #[arg(long, default_value_t = false)]
        no_cooldown: bool,
    },
    /// Fit a linear trend over the stored series and project it forward.
    Predict {
        /// Days past the last observation to project.
        #[arg(long, default_value_t = 3)]
        days_ahead: i64,

        /// Print the model and projection as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Report stored observation count and date range.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FeedConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FeedConfig::default(),
    };
    if let Some(store) = cli.store {
        config.store.path = store;
    }

    match cli.command {
        Commands::Backfill { days, no_cooldown } => run_backfill(config, days, no_cooldown),
        Commands::Predict { days_ahead, json } => run_predict(&config, days_ahead, json),
        Commands::Status => run_status(&config),
    }
}

fn run_backfill(mut config: FeedConfig, days: Option<u32>, no_cooldown: bool) -> Result<()> {
    if let Some(days) = days {
        config.schedule.lookback_days = days;
    }
    let tz = config.timezone()?;

    let store = PriceStore::new(&config.store.path);
    store
        .ensure_schema()
        .with_context(|| format!("opening price store {}", config.store.path.display()))?;

    let client = MarketDataClient::new(
        config.upstream.base_url.clone(),
        config.upstream.vs_currency.clone(),
        config.window(),
        config.timeout(),
    )?;

    let window = BackfillWindow::trailing(tz, Utc::now(), config.schedule.lookback_days);
    let targets = window.targets(tz, &config.schedule.hours);
    tracing::info!(
        start = %window.start,
        end = %window.end,
        targets = targets.len(),
        "starting backfill"
    );

    let mut backfill = config.backfill_config();
    if no_cooldown {
        backfill = backfill.without_cooldowns();
    }

    let summary = Ingestor::new(&client, &store, &ThreadSleeper, &LogProgress, backfill)
        .run(&targets)
        .context("backfill aborted")?;

    println!();
    println!("=== Backfill Summary ===");
    println!("Targets:        {}", summary.total);
    println!("New points:     {}", summary.inserted);
    println!("Already stored: {}", summary.duplicates);
    println!("Gaps skipped:   {}", summary.gaps);
    println!("Errors skipped: {}", summary.upstream_failures);
    println!(
        "Cooldowns:      {} gap, {} pacing",
        summary.gap_cooldowns, summary.pacing_cooldowns
    );
    for (at, err) in &summary.skipped {
        println!("  skipped {at}: {err}");
    }
    println!("Historical data population completed.");

    Ok(())
}

fn run_predict(config: &FeedConfig, days_ahead: i64, json: bool) -> Result<()> {
    let store = PriceStore::new(&config.store.path);
    let series = store
        .read_all_sorted()
        .with_context(|| format!("reading price store {}", config.store.path.display()))?;

    let (model, projection) = project(&series, days_ahead)?;

    if json {
        let out = serde_json::json!({ "model": model, "projection": projection });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_projection(&model, &projection);
    }
    Ok(())
}

fn print_projection(model: &TrendModel, projection: &Projection) {
    println!();
    println!("=== Trend Fit ===");
    println!("Observations:   {}", model.observations);
    println!("Slope:          {:.2} USD/day", model.slope);
    println!("Mean sq. error: {:.2}", model.mse);
    println!("R-squared:      {:.2}", model.r_squared);
    println!();
    println!(
        "Current price as of {}: ${:.2}",
        projection.current_time, projection.current_price
    );
    println!(
        "Predicted price for {}: ${:.2}",
        projection.target_time.date_naive(),
        projection.predicted_price
    );
    println!("Predicted change: {:.2}%", projection.percent_change);
}

fn run_status(config: &FeedConfig) -> Result<()> {
    let path = &config.store.path;
    if !path.exists() {
        println!("Store does not exist: {}", path.display());
        return Ok(());
    }

    let store = PriceStore::new(path);
    let count = store.count()?;
    println!("Store: {}", path.display());
    println!("Observations: {count}");
    if let Some((first, last)) = store.span()? {
        println!("Range: {first} to {last}");
    }
    Ok(())
}
