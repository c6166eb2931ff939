use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use match_collector::collect::{Collector, YearSpec};
use match_collector::config::{CollectorConfig, MAX_WORKERS};
use match_collector::orchestrator::ExecutionMode;
use match_collector::store::{self, IfExists};

#[derive(Debug, Parser)]
#[command(name = "match_collector")]
#[command(about = "Collect K League and J League match records")]
struct Cli {
    /// Season year. Two values are an inclusive range, other counts an explicit set.
    #[arg(short, long = "year", required = true)]
    years: Vec<i32>,

    /// League display name or alias (K1, K2, KPO, KSUPER, J1, J2, J3, J1PO, J2PO).
    /// Unknown names are skipped.
    #[arg(short, long = "league", required = true)]
    leagues: Vec<String>,

    #[arg(long)]
    parallel: bool,

    /// Worker count in parallel mode, clamped to 1..=32 (defaults to FETCH_PARALLELISM).
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    /// Also write the records into this SQLite database.
    #[arg(long)]
    db: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TableMode::Replace)]
    if_exists: TableMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TableMode {
    Replace,
    Append,
    Fail,
}

impl From<TableMode> for IfExists {
    fn from(mode: TableMode) -> Self {
        match mode {
            TableMode::Replace => IfExists::Replace,
            TableMode::Append => IfExists::Append,
            TableMode::Fail => IfExists::Fail,
        }
    }
}

fn worker_count(requested: Option<usize>, default: usize) -> usize {
    requested.map_or(default, |n| n.clamp(1, MAX_WORKERS))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = CollectorConfig::from_env()?;

    let mode = if cli.parallel {
        ExecutionMode::parallel(worker_count(cli.workers, config.default_workers))
    } else {
        ExecutionMode::Sequential
    };
    let years = match cli.years.as_slice() {
        [year] => YearSpec::Single(*year),
        list => YearSpec::List(list.to_vec()),
    };

    let collector = Collector::live(config, mode);
    let output = collector
        .collect(years, cli.leagues)
        .context("collection failed")?;

    println!("Collection complete: {}", output.file_name);
    println!("Records: {}", output.records.len());
    println!("Dropped after retry: {}", output.dropped);

    if output.records.is_empty() {
        println!("No records collected; nothing written");
    } else {
        let csv_path = store::save_csv(&output.records, &cli.out_dir, &output.file_name)?;
        let json_path = store::save_json(&output.records, &cli.out_dir, &output.file_name)?;
        println!("CSV: {}", csv_path.display());
        println!("JSON: {}", json_path.display());
    }

    if let Some(db_path) = cli.db.filter(|_| !output.records.is_empty()) {
        let mut conn = store::open_db(&db_path)?;
        let rows = store::save_sqlite(
            &mut conn,
            &output.file_name,
            &output.records,
            cli.if_exists.into(),
        )?;
        println!("SQLite: {} ({} rows in {})", db_path.display(), rows, output.file_name);
    }

    for skipped in &output.skipped {
        match skipped.year {
            Some(year) => println!("skipped {} {}: {}", skipped.league, year, skipped.reason),
            None => println!("skipped {}: {}", skipped.league, skipped.reason),
        }
    }

    Ok(())
}
