//! Credit spread screener CLI
//!
//! # Usage
//!
//! ```bash
//! # Set API token (only needed when a chain is not cached)
//! export OPCHAIN_API_TOKEN=your-token
//!
//! # Fetch and cache today's chains for every symbol in a list
//! opchain fetch lists/etfs.csv lists/stocks.csv
//!
//! # Screen one symbol, candidates as CSV on stdout
//! opchain screen --symbol SPY --side PUT --days 45
//!
//! # Best spreads across symbol lists, one CSV per expiration
//! opchain best lists/etfs.csv --out-dir reports
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use opchain::analytics::{ScreeningConfig, SpreadScreener};
use opchain::data::{read_symbol_list, ChainCache, ChainClient, IngestOptions, RawChain, Side};
use opchain::report::{
    best_spreads, best_to_dataframe, build_report, candidates_to_dataframe, write_csv, write_report,
    BestSpread, ReportFilter,
};

const TOKEN_VAR: &str = "OPCHAIN_API_TOKEN";

/// Consecutive fetch failures tolerated by `fetch`.
const MAX_FETCH_FAILURES: usize = 10;

/// Consecutive load failures tolerated by `best`.
const MAX_LOAD_FAILURES: usize = 3;

/// Credit spread screener.
#[derive(Parser)]
#[command(name = "opchain")]
#[command(about = "Screen option chains for vertical credit spreads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Chain cache directory
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and cache chains for every symbol in the given lists
    Fetch {
        /// Symbol list files
        #[arg(required = true)]
        lists: Vec<PathBuf>,

        /// Run date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        run_date: Option<String>,
    },

    /// Screen one symbol and print candidates as CSV
    Screen {
        #[arg(short, long)]
        symbol: String,

        /// PUT or CALL
        #[arg(long)]
        side: Option<String>,

        /// Screen the expiration closest to this many days
        #[arg(long)]
        days: Option<i32>,

        /// Run date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        run_date: Option<String>,

        /// Screening configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fetch even when the chain is cached
        #[arg(long)]
        reload: bool,
    },

    /// Best spreads of every symbol in the given lists
    Best {
        /// Symbol list files
        #[arg(required = true)]
        lists: Vec<PathBuf>,

        /// Run date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        run_date: Option<String>,

        /// Only scan the expiration closest to this many days
        #[arg(long)]
        exp_days: Option<i32>,

        /// Write one CSV per expiration here instead of stdout
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Screening configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Report filter (JSON)
        #[arg(short, long)]
        filter: Option<PathBuf>,
    },
}

fn parse_run_date(run_date: Option<String>) -> Result<NaiveDate> {
    match run_date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d").context("Invalid run date format"),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Load a JSON settings file, or defaults when no path is given.
fn load_settings<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) => {
            let content = fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            serde_json::from_str(&content).with_context(|| format!("Invalid settings in {}", p.display()))
        }
        None => Ok(T::default()),
    }
}

fn read_symbols(lists: &[PathBuf]) -> Result<Vec<String>> {
    let mut symbols = Vec::new();
    for list in lists {
        let found = read_symbol_list(list)?;
        info!("{} symbols in {}", found.len(), list.display());
        for symbol in found {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
    }
    Ok(symbols)
}

fn client_from_env() -> Option<ChainClient> {
    std::env::var(TOKEN_VAR).ok().map(ChainClient::new)
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Cached chain, fetching and caching it when missing or on reload.
async fn load_or_fetch(
    cache: &ChainCache,
    client: Option<&ChainClient>,
    symbol: &str,
    run_date: NaiveDate,
    reload: bool,
) -> Result<RawChain> {
    if !reload {
        if let Some(chain) = cache.load(symbol, run_date)? {
            return Ok(chain);
        }
    }

    let client = client.with_context(|| format!("{} environment variable not set", TOKEN_VAR))?;
    let fetched = client.get_chain_for(symbol, run_date).await?;
    let path = cache.save(symbol, run_date, &fetched.body)?;
    info!("saved {} chain to {}", symbol, path.display());
    Ok(fetched.chain)
}

async fn cmd_fetch(cache: &ChainCache, lists: &[PathBuf], run_date: NaiveDate) -> Result<()> {
    let client = client_from_env().with_context(|| format!("{} environment variable not set", TOKEN_VAR))?;
    let symbols = read_symbols(lists)?;

    let pb = progress_bar(symbols.len())?;
    let mut failures = 0;
    let mut fetched = 0;

    for symbol in &symbols {
        pb.set_message(symbol.clone());
        match load_or_fetch(cache, Some(&client), symbol, run_date, true).await {
            Ok(_) => {
                failures = 0;
                fetched += 1;
            }
            Err(e) => {
                warn!("fetch {} failed: {:#}", symbol, e);
                failures += 1;
                if failures >= MAX_FETCH_FAILURES {
                    pb.abandon_with_message("too many failures");
                    bail!("{} consecutive fetch failures, stopping", failures);
                }
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!("{} of {} fetched", fetched, symbols.len()));
    Ok(())
}

async fn cmd_screen(
    cache: &ChainCache,
    symbol: &str,
    side: Option<String>,
    days: Option<i32>,
    run_date: NaiveDate,
    config: Option<PathBuf>,
    reload: bool,
) -> Result<()> {
    let mut config: ScreeningConfig = load_settings(config.as_deref())?;
    if let Some(side) = side {
        config.set_side(&side)?;
    }

    let client = client_from_env();
    let chain = load_or_fetch(cache, client.as_ref(), symbol, run_date, reload).await?;
    let contracts = chain.contracts(&IngestOptions {
        side: config.side,
        days_to_expiration: days.or(config.days_to_expiration),
        ..IngestOptions::default()
    })?;
    // the ingest keeps only the closest available expiration
    config.days_to_expiration = None;

    let candidates = SpreadScreener::new(config).screen(&contracts)?;
    info!("{}: {} candidates", symbol, candidates.len());

    let mut df = candidates_to_dataframe(&candidates)?;
    write_csv(&mut df, io::stdout().lock())?;
    Ok(())
}

async fn best_for_symbol(
    cache: &ChainCache,
    client: Option<&ChainClient>,
    symbol: &str,
    run_date: NaiveDate,
    exp_days: Option<i32>,
    config: &ScreeningConfig,
    per_expiration: usize,
) -> Result<Vec<BestSpread>> {
    let chain = load_or_fetch(cache, client, symbol, run_date, false).await?;
    let snapshot = chain.snapshot(run_date)?;
    let contracts = chain.contracts(&IngestOptions {
        days_to_expiration: exp_days,
        ..IngestOptions::default()
    })?;
    let sides = match config.side {
        Some(side) => vec![side],
        None => vec![Side::Put, Side::Call],
    };
    let mut config = config.clone();
    config.days_to_expiration = None;
    Ok(best_spreads(&contracts, &snapshot, &sides, &config, per_expiration)?)
}

async fn cmd_best(
    cache: &ChainCache,
    lists: &[PathBuf],
    run_date: NaiveDate,
    exp_days: Option<i32>,
    out_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    filter: Option<PathBuf>,
) -> Result<()> {
    let config: ScreeningConfig = load_settings(config.as_deref())?;
    let filter: ReportFilter = load_settings(filter.as_deref())?;
    let client = client_from_env();
    let symbols = read_symbols(lists)?;

    let pb = progress_bar(symbols.len())?;
    let mut failures = 0;
    let mut rows = Vec::new();

    for symbol in &symbols {
        pb.set_message(symbol.clone());
        match best_for_symbol(
            cache,
            client.as_ref(),
            symbol,
            run_date,
            exp_days,
            &config,
            filter.per_expiration,
        )
        .await
        {
            Ok(found) => {
                failures = 0;
                rows.extend(found);
            }
            Err(e) => {
                warn!("{}: {:#}", symbol, e);
                failures += 1;
                if failures >= MAX_LOAD_FAILURES {
                    pb.abandon_with_message("too many failures");
                    bail!("{} consecutive load failures, stopping", failures);
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} rows", rows.len()));

    let report = build_report(rows, &filter);
    match out_dir {
        Some(dir) => {
            let paths = write_report(&report, &dir, run_date)?;
            info!("wrote {} report files to {}", paths.len(), dir.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            for rows in report.by_days.values() {
                let mut df = best_to_dataframe(rows)?;
                write_csv(&mut df, &mut stdout)?;
            }
            if !report.index.is_empty() {
                let mut df = best_to_dataframe(&report.index)?;
                write_csv(&mut df, &mut stdout)?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, CSV goes to stdout
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("opchain=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cache = ChainCache::new(&cli.data_dir);

    match cli.command {
        Commands::Fetch { lists, run_date } => {
            let run_date = parse_run_date(run_date)?;
            cmd_fetch(&cache, &lists, run_date).await?;
        }
        Commands::Screen {
            symbol,
            side,
            days,
            run_date,
            config,
            reload,
        } => {
            let run_date = parse_run_date(run_date)?;
            cmd_screen(&cache, &symbol, side, days, run_date, config, reload).await?;
        }
        Commands::Best {
            lists,
            run_date,
            exp_days,
            out_dir,
            config,
            filter,
        } => {
            let run_date = parse_run_date(run_date)?;
            cmd_best(&cache, &lists, run_date, exp_days, out_dir, config, filter).await?;
        }
    }

    Ok(())
}
