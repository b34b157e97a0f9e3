mod config;
mod consolidate;
mod harvest;
mod schema;
mod session;
mod storage;
mod table;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::config::Config;
use crate::session::Session;
use crate::storage::DataDirs;
use crate::table::TableFormat;

#[derive(Parser)]
#[command(name = "mf_scraper", about = "MoneyForward cash-flow ledger harvester")]
struct Cli {
    /// Config JSON path (default: $CONFIG_PATH, then ./config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and walk the ledger backward, saving every period
    Harvest,
    /// Merge saved period files into all.csv / all.tsv
    Consolidate,
    /// Harvest, then consolidate (the full pipeline)
    Run,
    /// Show what has been harvested so far
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let dirs = DataDirs::new(&config.data_dir);
    dirs.ensure()?;

    let result = match cli.command {
        Commands::Harvest => {
            let stats = run_harvest(&config, &dirs).await?;
            print_harvest(&stats);
            Ok(())
        }
        Commands::Consolidate => {
            let stats = consolidate::consolidate(&dirs)?;
            print_consolidate(&stats);
            Ok(())
        }
        Commands::Run => {
            let stats = run_harvest(&config, &dirs).await?;
            print_harvest(&stats);
            let stats = consolidate::consolidate(&dirs)?;
            print_consolidate(&stats);
            Ok(())
        }
        Commands::Stats => show_stats(&dirs),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Harvest inside a browser session that is closed even when the traversal
/// fails partway; already saved periods stay valid.
async fn run_harvest(config: &Config, dirs: &DataDirs) -> anyhow::Result<harvest::HarvestStats> {
    let mut session = Session::launch(config).await?;
    let outcome = harvest::run(&mut session, config, dirs).await;
    if let Err(e) = session.close().await {
        warn!("Browser close failed: {:#}", e);
    }
    outcome
}

fn print_harvest(stats: &harvest::HarvestStats) {
    println!(
        "Harvested {} periods ({} with transactions, {} without).",
        stats.periods, stats.saved, stats.empty
    );
}

fn print_consolidate(stats: &consolidate::ConsolidateStats) {
    println!(
        "Consolidated {} CSV files ({} records), {} TSV files ({} records).",
        stats.csv_periods, stats.csv_records, stats.tsv_periods, stats.tsv_records
    );
}

fn show_stats(dirs: &DataDirs) -> anyhow::Result<()> {
    let files = dirs.list_periods(TableFormat::Csv)?;
    let mut records = 0usize;
    for path in &files {
        let body = std::fs::read_to_string(path)?;
        records += body.lines().skip(1).filter(|l| !l.is_empty()).count();
    }

    println!("Periods: {}", files.len());
    println!("Records: {}", records);
    if let (Some(first), Some(last)) = (files.first(), files.last()) {
        let from = storage::period_start_key(first).unwrap_or_default();
        let to = storage::period_start_key(last).unwrap_or_default();
        println!("Oldest:  {}", from);
        println!("Newest:  {}", to);
    }
    let built = dirs.consolidated_path(TableFormat::Csv).exists();
    println!("Dataset: {}", if built { "present" } else { "not built" });
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
