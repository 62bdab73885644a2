use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use clap::Parser;
use factor_allocator::config::FactorFiles;
use factor_allocator::data::CsvPriceSource;
use factor_allocator::data::PriceSource;
use factor_allocator::AllocationResult;
use factor_allocator::Allocator;
use factor_allocator::AllocatorConfig;
use prettytable::row;
use prettytable::Table;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
  name = "factor-allocator",
  about = "Allocate a budget across tickers with a Carhart max-Sharpe portfolio"
)]
struct Args {
  /// Comma-separated tickers, e.g. AAPL,MSFT,NVDA
  #[arg(long, value_delimiter = ',', required = true)]
  tickers: Vec<String>,

  /// Cash to allocate
  #[arg(long)]
  budget: f64,

  /// Wide price CSV with a Date column and one column per ticker
  #[arg(long, conflicts_with = "yahoo")]
  prices: Option<PathBuf>,

  /// Fetch adjusted closes from Yahoo Finance (needs the `yahoo` feature)
  #[arg(long)]
  yahoo: bool,

  /// Fama-French three-factor daily CSV
  #[arg(long)]
  three_factor: Option<PathBuf>,

  /// Fama-French momentum daily CSV
  #[arg(long)]
  momentum: Option<PathBuf>,

  /// JSON file overriding the default configuration
  #[arg(long)]
  config: Option<PathBuf>,

  /// Print the result as JSON instead of a table
  #[arg(long)]
  json: bool,
}

fn main() -> anyhow::Result<()> {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("factor_allocator=info"));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .init();
  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => AllocatorConfig::from_json_file(path)
      .with_context(|| format!("loading config '{}'", path.display()))?,
    None => AllocatorConfig::default(),
  };
  if args.three_factor.is_some() || args.momentum.is_some() {
    let defaults = config.factor_files.clone();
    config.factor_files = FactorFiles::new(
      args.three_factor.clone().unwrap_or(defaults.three_factor),
      args.momentum.clone().unwrap_or(defaults.momentum),
    );
  }

  let result = if let Some(path) = &args.prices {
    let source = CsvPriceSource::new(path);
    let prices = source
      .load()
      .with_context(|| format!("loading prices '{}'", path.display()))?;
    run(config, prices, &args)?
  } else if args.yahoo {
    run_yahoo(config, &args)?
  } else {
    bail!("either --prices <csv> or --yahoo is required");
  };

  if args.json {
    println!("{}", serde_json::to_string_pretty(&result)?);
  } else {
    print_report(&result);
  }
  Ok(())
}

fn run<P: PriceSource>(
  config: AllocatorConfig,
  prices: P,
  args: &Args,
) -> anyhow::Result<AllocationResult> {
  let factors = config.factor_files.clone();
  let allocator = Allocator::new(config, prices, factors);
  allocator
    .allocate(&args.tickers, args.budget)
    .map_err(|e| {
      error!(kind = %e.kind(), "allocation failed");
      e
    })
    .context("allocation failed")
}

#[cfg(feature = "yahoo")]
fn run_yahoo(config: AllocatorConfig, args: &Args) -> anyhow::Result<AllocationResult> {
  run(config, factor_allocator::data::YahooPriceSource::new(), args)
}

#[cfg(not(feature = "yahoo"))]
fn run_yahoo(_config: AllocatorConfig, _args: &Args) -> anyhow::Result<AllocationResult> {
  bail!("this binary was built without Yahoo support; rebuild with --features yahoo")
}

fn print_report(result: &AllocationResult) {
  let mut table = Table::new();
  table.add_row(row!["Ticker", "Weight", "Price", "Shares", "Invested", "Realized"]);
  for h in result.holdings() {
    table.add_row(row![
      h.symbol,
      format!("{:.5}", h.weight),
      format!("{:.2}", h.price),
      h.shares,
      format!("{:.2}", h.invested),
      format!("{:.4}", h.realized_weight)
    ]);
  }
  table.printstd();

  let mut summary = Table::new();
  summary.add_row(row!["Budget", format!("{:.2}", result.budget())]);
  summary.add_row(row!["Invested", format!("{:.2}", result.total_invested())]);
  summary.add_row(row!["Leftover cash", format!("{:.2}", result.leftover_cash())]);
  summary.add_row(row!["Expected return", format!("{:.4}", result.expected_return())]);
  summary.add_row(row!["Volatility", format!("{:.4}", result.volatility())]);
  let sharpe = if result.sharpe_ratio().is_nan() {
    "n/a".to_string()
  } else {
    format!("{:.4}", result.sharpe_ratio())
  };
  summary.add_row(row!["Sharpe ratio", sharpe]);
  if !result.dropped().is_empty() {
    summary.add_row(row!["Dropped", result.dropped().join(", ")]);
  }
  for ex in result.excluded() {
    summary.add_row(row![format!("Excluded {}", ex.symbol), ex.reason]);
  }
  summary.printstd();
}
