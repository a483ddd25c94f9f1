use analytics::PerformanceReport;
use anyhow::Context;
use backtester::{Backtester, business_days, write_report};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use configuration::{Config, RunConfig};
use core_types::{Instrument, PortfolioSnapshot};
use engine::{Orchestrator, RunOutcome, RunRequest};
use events::{EventPublisher, Phase, ProgressEvent};
use std::path::PathBuf;
use std::sync::Arc;

/// The main entry point for the Quorum analysis engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets such as provider API keys may live in a .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = configuration::load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let _log_guard = configuration::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run(args) => handle_run(args, &config).await,
        Commands::Backtest(args) => handle_backtest(args, &config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Multi-analyst, multi-market signal orchestration.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every analyst once for a set of tickers and print the decisions.
    Run(RunArgs),
    /// Replay the pipeline over a date range against a simulated portfolio.
    Backtest(BacktestArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Tickers to analyse; the market is inferred (e.g. "AAPL", "600519", "0700.HK").
    #[arg(required = true)]
    tickers: Vec<String>,

    /// The as-of date (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Cash the decisions are sized against. Defaults to `[backtest] initial_cash`.
    #[arg(long)]
    cash: Option<rust_decimal::Decimal>,
}

#[derive(Parser)]
struct BacktestArgs {
    #[arg(required = true)]
    tickers: Vec<String>,

    /// First date (format: YYYY-MM-DD). Overrides `[backtest] start_date`.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last date (format: YYYY-MM-DD). Overrides `[backtest] end_date`.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Where to write the JSON report. Overrides `[backtest] report_path`.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_tickers(tickers: &[String]) -> anyhow::Result<Vec<Instrument>> {
    tickers
        .iter()
        .map(|t| Instrument::parse(t).with_context(|| format!("invalid ticker '{}'", t)))
        .collect()
}

/// Mirrors node transitions into the log.
struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: ProgressEvent) {
        match event.phase {
            Phase::Started => tracing::debug!(node = %event.node_id, instrument = %event.instrument, "{}", event.label),
            Phase::Completed => tracing::info!(node = %event.node_id, instrument = %event.instrument, "{}", event.label),
            Phase::Substituted | Phase::Failed => {
                tracing::warn!(node = %event.node_id, instrument = %event.instrument, phase = %event.phase, "{}", event.label)
            }
        }
    }
}

/// Persists the signal cache when a spill path is configured.
fn spill_cache(orchestrator: &Orchestrator, config: &Config) -> anyhow::Result<()> {
    if let Some(path) = &config.cache.spill_path {
        let written = orchestrator
            .cache()
            .spill(path)
            .with_context(|| format!("failed to spill the signal cache to {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = written, "Signal cache spilled.");
    }
    Ok(())
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

async fn handle_run(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let instruments = parse_tickers(&args.tickers)?;
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());
    let cash = args.cash.unwrap_or(config.backtest.initial_cash);

    let orchestrator = Orchestrator::from_config(config)?;
    let run_config = RunConfig::from_config(config);
    let portfolio = PortfolioSnapshot::with_cash(cash, run_config.risk.margin_requirement);
    let request = RunRequest::new(instruments, as_of, portfolio, run_config);

    let mut handle = orchestrator.submit_run(request);
    tracing::info!(run_id = %handle.id(), as_of = %as_of, "Run submitted.");
    while let Some(event) = handle.next_event().await {
        LogPublisher.publish(event);
    }
    let outcome = handle.result().await?;

    print_decisions(&outcome);
    spill_cache(&orchestrator, config)
}

fn print_decisions(outcome: &RunOutcome) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Instrument",
        "Action",
        "Quantity",
        "Confidence",
        "Substituted",
        "Faults",
        "Rationale",
    ]);
    for (instrument, result) in &outcome.instruments {
        let substituted = result.substituted.iter().cloned().collect::<Vec<_>>().join(", ");
        let faults = result
            .faults
            .iter()
            .map(|f| format!("{}: {}", f.node, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        match &result.decision {
            Some(decision) => table.add_row(vec![
                Cell::new(instrument),
                Cell::new(decision.action),
                Cell::new(decision.quantity),
                Cell::new(decision.confidence),
                Cell::new(substituted),
                Cell::new(faults),
                Cell::new(&decision.rationale),
            ]),
            None => table.add_row(vec![
                Cell::new(instrument),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(substituted),
                Cell::new(faults),
                Cell::new("no decision"),
            ]),
        };
    }
    println!("Decisions as of {}", outcome.as_of);
    println!("{table}");
}

// ==============================================================================
// Backtest Command Logic
// ==============================================================================

async fn handle_backtest(args: BacktestArgs, config: &Config) -> anyhow::Result<()> {
    let instruments = parse_tickers(&args.tickers)?;
    let start = args
        .from
        .or(config.backtest.start_date)
        .context("no start date: pass --from or set [backtest] start_date")?;
    let end = args.to.or(config.backtest.end_date).unwrap_or_else(|| Local::now().date_naive());
    let dates = business_days(start, end);

    let orchestrator = Orchestrator::from_config(config)?;
    let mut backtester = Backtester::new(
        orchestrator.clone(),
        instruments,
        dates,
        config.backtest.initial_cash,
        RunConfig::from_config(config),
    )
    .with_publisher(Arc::new(LogPublisher))
    .with_progress(true);

    let report = backtester.run().await?;
    print_report(&report);

    if let Some(path) = args.report.or_else(|| config.backtest.report_path.clone()) {
        write_report(&report, &path)?;
        println!("Report written to {}", path.display());
    }
    spill_cache(&orchestrator, config)
}

fn print_report(report: &PerformanceReport) {
    let ratio = |r: Option<rust_decimal::Decimal>| r.map_or("-".to_string(), |v| v.to_string());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Initial value".to_string(), report.initial_value.to_string()]);
    table.add_row(vec!["Final value".to_string(), report.final_value.to_string()]);
    table.add_row(vec!["Net profit".to_string(), report.total_net_profit.to_string()]);
    table.add_row(vec!["Total return %".to_string(), report.total_return_pct.to_string()]);
    table.add_row(vec!["Realized gains".to_string(), report.realized_gains.to_string()]);
    table.add_row(vec!["Max drawdown %".to_string(), report.max_drawdown_pct.to_string()]);
    table.add_row(vec!["Sharpe".to_string(), ratio(report.sharpe_ratio)]);
    table.add_row(vec!["Sortino".to_string(), ratio(report.sortino_ratio)]);
    table.add_row(vec!["Calmar".to_string(), ratio(report.calmar_ratio)]);
    table.add_row(vec!["Trading days".to_string(), report.trading_days.to_string()]);
    table.add_row(vec!["Trades".to_string(), report.trades_executed.to_string()]);
    table.add_row(vec!["Faults".to_string(), report.fault_log.len().to_string()]);
    println!("{table}");

    if !report.fault_log.is_empty() {
        let mut faults = Table::new();
        faults.load_preset(UTF8_FULL).set_header(vec!["Date", "Instrument", "Node", "Message"]);
        for fault in &report.fault_log {
            faults.add_row(vec![
                fault.date.to_string(),
                fault.instrument.to_string(),
                fault.node.clone().unwrap_or_else(|| "-".to_string()),
                fault.message.clone(),
            ]);
        }
        println!("{faults}");
    }
}
