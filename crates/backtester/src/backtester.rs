use crate::error::BacktestError;
use analytics::{AnalyticsEngine, FaultRecord, PerformanceReport, SessionRecord, ValuationPoint};
use chrono::NaiveDate;
use configuration::RunConfig;
use core_types::{Action, Instrument};
use engine::{Orchestrator, RunOutcome, RunRequest};
use events::{EventPublisher, NullPublisher};
use indicatif::{ProgressBar, ProgressStyle};
use portfolio::Portfolio;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a backtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestState {
    Initialized,
    Stepping,
    Completed,
    /// Terminal. Reached on a configuration error or a fatal engine error.
    Aborted,
}

impl fmt::Display for BacktestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BacktestState::Initialized => "initialized",
            BacktestState::Stepping => "stepping",
            BacktestState::Completed => "completed",
            BacktestState::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// The main backtesting engine.
///
/// Replays the pipeline once per date in ascending order against a simulated
/// portfolio, then turns the resulting valuation series into a `PerformanceReport`.
pub struct Backtester {
    // --- Context ---
    instruments: Vec<Instrument>,
    dates: Vec<NaiveDate>,
    initial_cash: Decimal,
    config: RunConfig,
    state: BacktestState,
    // --- Components ---
    orchestrator: Orchestrator,
    analytics_engine: AnalyticsEngine,
    publisher: Arc<dyn EventPublisher>,
    show_progress: bool,
    // --- Simulation state ---
    portfolio: Option<Portfolio>,
    last_prices: BTreeMap<Instrument, Decimal>,
    session: SessionRecord,
}

impl Backtester {
    pub fn new(
        orchestrator: Orchestrator,
        instruments: Vec<Instrument>,
        dates: Vec<NaiveDate>,
        initial_cash: Decimal,
        config: RunConfig,
    ) -> Self {
        let instruments: Vec<Instrument> = instruments
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let dates: Vec<NaiveDate> = dates.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        Self {
            instruments,
            dates,
            initial_cash,
            config,
            state: BacktestState::Initialized,
            orchestrator,
            analytics_engine: AnalyticsEngine::new(),
            publisher: Arc::new(NullPublisher),
            show_progress: false,
            portfolio: None,
            last_prices: BTreeMap::new(),
            session: SessionRecord::default(),
        }
    }

    /// Forwards the progress events of every step to `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Draws a terminal progress bar while stepping.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> BacktestState {
        self.state
    }

    /// The simulated portfolio, once the backtest has started.
    pub fn portfolio(&self) -> Option<&Portfolio> {
        self.portfolio.as_ref()
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    /// Runs the simulation over every date.
    ///
    /// Per-instrument faults never abort the loop: they become an implicit hold and an
    /// entry in the fault log. Configuration errors abort before the first step; an
    /// engine error that fails a whole run (such as cache corruption) aborts mid-way.
    pub async fn run(&mut self) -> Result<PerformanceReport, BacktestError> {
        if self.state != BacktestState::Initialized {
            return Err(BacktestError::Configuration(format!(
                "backtest already {}",
                self.state
            )));
        }
        let progress_bar = self.progress_bar()?;
        let portfolio = match self.prepare() {
            Ok(portfolio) => portfolio,
            Err(err) => {
                self.state = BacktestState::Aborted;
                tracing::error!(error = %err, "Backtest aborted before the first step.");
                return Err(err);
            }
        };
        self.portfolio = Some(portfolio);
        self.session = SessionRecord {
            initial_capital: self.initial_cash,
            ..Default::default()
        };
        self.state = BacktestState::Stepping;
        tracing::info!(
            instruments = self.instruments.len(),
            dates = self.dates.len(),
            initial_cash = %self.initial_cash,
            "Backtest started."
        );

        let dates = self.dates.clone();
        for date in dates {
            if let Err(err) = self.step(date).await {
                self.state = BacktestState::Aborted;
                progress_bar.abandon_with_message("Backtest aborted.");
                tracing::error!(date = %date, error = %err, "Backtest aborted.");
                return Err(err);
            }
            progress_bar.inc(1);
        }
        progress_bar.finish_with_message("Simulation complete.");

        if let Some(portfolio) = &self.portfolio {
            self.session.realized_gains = portfolio.total_realized_gains();
        }
        let report = match self.analytics_engine.calculate(&self.session) {
            Ok(report) => report,
            Err(err) => {
                self.state = BacktestState::Aborted;
                tracing::error!(error = %err, "Backtest aborted while building the report.");
                return Err(err.into());
            }
        };
        self.state = BacktestState::Completed;
        tracing::info!(
            final_value = %report.final_value,
            total_return_pct = %report.total_return_pct,
            max_drawdown_pct = %report.max_drawdown_pct,
            trades = report.trades_executed,
            faults = report.fault_log.len(),
            "Backtest completed."
        );
        Ok(report)
    }

    fn prepare(&self) -> Result<Portfolio, BacktestError> {
        if self.dates.is_empty() {
            return Err(BacktestError::Configuration("the date sequence is empty".to_string()));
        }
        if self.instruments.is_empty() {
            return Err(BacktestError::Configuration("no instruments to backtest".to_string()));
        }
        if self.initial_cash <= Decimal::ZERO {
            return Err(BacktestError::Configuration(format!(
                "initial cash must be positive, got {}",
                self.initial_cash
            )));
        }
        Portfolio::new(self.initial_cash, self.config.risk.margin_requirement)
            .map_err(|e| BacktestError::Configuration(e.to_string()))
    }

    fn progress_bar(&self) -> Result<ProgressBar, BacktestError> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let progress_bar = ProgressBar::new(self.dates.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                .progress_chars("=>-"),
        );
        Ok(progress_bar)
    }

    /// One date: run the pipeline, apply its decisions, mark to market.
    async fn step(&mut self, date: NaiveDate) -> Result<(), BacktestError> {
        let Some(portfolio) = self.portfolio.as_ref() else {
            return Err(BacktestError::Configuration("backtest not started".to_string()));
        };
        let equity = portfolio.calculate_total_equity(&self.last_prices)?;
        let request = RunRequest::new(
            self.instruments.clone(),
            date,
            portfolio.snapshot(equity),
            self.config.clone(),
        );
        let outcome = self.orchestrator.run(request, Arc::clone(&self.publisher)).await?;

        self.apply_outcome(date, &outcome);

        let Some(portfolio) = self.portfolio.as_ref() else {
            return Err(BacktestError::Configuration("backtest not started".to_string()));
        };
        let total_value = portfolio.calculate_total_equity(&self.last_prices)?;
        tracing::debug!(date = %date, total_value = %total_value, cash = %portfolio.cash(), "Marked to market.");
        self.session.valuations.push(ValuationPoint {
            date,
            total_value,
            cash: portfolio.cash(),
        });
        Ok(())
    }

    /// Applies decisions in instrument order. Every fault becomes a hold plus a log entry.
    fn apply_outcome(&mut self, date: NaiveDate, outcome: &RunOutcome) {
        let Some(portfolio) = self.portfolio.as_mut() else {
            return;
        };

        for (instrument, result) in &outcome.instruments {
            if let Some(price) = outcome.closing_price(instrument) {
                self.last_prices.insert(instrument.clone(), price);
            }
            for fault in &result.faults {
                tracing::warn!(date = %date, instrument = %instrument, node = %fault.node, error = %fault.message, "Node fault; holding.");
                self.session.fault_log.push(FaultRecord {
                    date,
                    instrument: instrument.clone(),
                    node: Some(fault.node.clone()),
                    message: fault.message.clone(),
                });
            }

            let Some(decision) = &result.decision else {
                if result.faults.is_empty() {
                    self.session.fault_log.push(FaultRecord {
                        date,
                        instrument: instrument.clone(),
                        node: None,
                        message: "no decision was produced".to_string(),
                    });
                }
                continue;
            };
            if decision.action == Action::Hold || decision.quantity == 0 {
                continue;
            }
            let Some(price) = self.last_prices.get(instrument).copied() else {
                tracing::warn!(date = %date, instrument = %instrument, "No known price; holding.");
                self.session.fault_log.push(FaultRecord {
                    date,
                    instrument: instrument.clone(),
                    node: None,
                    message: format!("no price to execute {}", decision.action),
                });
                continue;
            };

            match portfolio.apply(decision, price) {
                Ok(fill) => {
                    if fill.was_clipped() {
                        tracing::debug!(
                            date = %date,
                            instrument = %instrument,
                            requested = fill.requested,
                            filled = fill.filled,
                            "Decision clipped by available cash or holdings."
                        );
                    }
                    if fill.filled > 0 {
                        self.session.trades_executed += 1;
                        tracing::info!(
                            date = %date,
                            instrument = %instrument,
                            action = %fill.action,
                            quantity = fill.filled,
                            price = %fill.price,
                            "Decision executed."
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(date = %date, instrument = %instrument, error = %err, "Decision rejected; holding.");
                    self.session.fault_log.push(FaultRecord {
                        date,
                        instrument: instrument.clone(),
                        node: None,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
