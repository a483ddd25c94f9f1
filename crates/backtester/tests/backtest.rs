use analysts::{AnalystError, DataRequirements, EvaluationContext, SignalProducer, UpstreamSignals};
use async_trait::async_trait;
use backtester::{BacktestError, BacktestState, Backtester, business_days, read_report, submit_backtest, write_report};
use chrono::{Datelike, NaiveDate};
use configuration::RunConfig;
use core_types::{DataDomain, DataSet, DateRange, FieldSet, Instrument, Market, PriceBar, SignalResult, Stance};
use engine::{ExecutionGraph, Orchestrator};
use providers::{DataProvider, ProviderFault, ProviderRegistry, RetryPolicy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_cache::SignalCache;
use std::sync::Arc;

/// Always bullish, or always failing hard.
struct Scripted {
    id: &'static str,
    broken: bool,
}

#[async_trait]
impl SignalProducer for Scripted {
    fn id(&self) -> &str {
        self.id
    }

    fn requirements(&self) -> DataRequirements {
        DataRequirements {
            fields: vec![FieldSet::all(DataDomain::Prices)],
            lookback_days: None,
        }
    }

    async fn evaluate(
        &self,
        _instrument: &Instrument,
        _data: &DataSet,
        _upstream: &UpstreamSignals,
        context: &EvaluationContext,
    ) -> Result<SignalResult, AnalystError> {
        if self.broken {
            return Err(AnalystError::IndicatorError("scripted failure".to_string()));
        }
        Ok(SignalResult::new(self.id, Stance::Bullish, dec!(80), "trend up", context.as_of))
    }
}

/// Daily bars whose close is given by a function of the date.
struct DailyPrices(fn(NaiveDate) -> Decimal);

/// Rises by one cent per day of the year.
fn close_on(date: NaiveDate) -> Decimal {
    dec!(10) + Decimal::from(date.ordinal()) / dec!(100)
}

fn twenty(_: NaiveDate) -> Decimal {
    dec!(20)
}

#[async_trait]
impl DataProvider for DailyPrices {
    fn name(&self) -> &str {
        "daily"
    }

    fn covers(&self, market: Market, domain: DataDomain) -> bool {
        market == Market::Us && domain == DataDomain::Prices
    }

    async fn fetch(
        &self,
        _instrument: &Instrument,
        _fields: &FieldSet,
        range: &DateRange,
    ) -> Result<DataSet, ProviderFault> {
        let prices = range
            .start()
            .iter_days()
            .take_while(|d| *d <= range.end())
            .map(|date| {
                let close = (self.0)(date);
                PriceBar {
                    date,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 10_000,
                }
            })
            .collect();
        Ok(DataSet {
            prices,
            ..Default::default()
        })
    }
}

fn orchestrator(broken: bool) -> Orchestrator {
    orchestrator_with_prices(broken, close_on)
}

fn orchestrator_with_prices(broken: bool, close: fn(NaiveDate) -> Decimal) -> Orchestrator {
    let producer: Arc<dyn SignalProducer> = Arc::new(Scripted { id: "trend", broken });
    let graph = ExecutionGraph::standard(vec![(producer, Vec::new())]).unwrap();
    let provider: Arc<dyn DataProvider> = Arc::new(DailyPrices(close));
    let registry = ProviderRegistry::from_providers(vec![(1, provider)], RetryPolicy::default()).unwrap();
    Orchestrator::new(graph, Arc::new(registry), Arc::new(SignalCache::new(256))).unwrap()
}

fn week() -> Vec<NaiveDate> {
    business_days(
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
    )
}

fn aapl() -> Instrument {
    Instrument::new("AAPL", Market::Us)
}

#[tokio::test]
async fn empty_date_sequence_aborts() {
    let mut backtester = Backtester::new(orchestrator(false), vec![aapl()], Vec::new(), dec!(10000), RunConfig::default());

    let err = backtester.run().await.unwrap_err();
    assert!(matches!(err, BacktestError::Configuration(_)));
    assert_eq!(backtester.state(), BacktestState::Aborted);
}

#[tokio::test]
async fn non_positive_cash_aborts_before_the_first_step() {
    for cash in [Decimal::ZERO, dec!(-100)] {
        let mut backtester = Backtester::new(orchestrator(false), vec![aapl()], week(), cash, RunConfig::default());

        let err = backtester.run().await.unwrap_err();
        assert!(matches!(err, BacktestError::Configuration(_)));
        assert_eq!(backtester.state(), BacktestState::Aborted);
        assert!(backtester.session().valuations.is_empty());
    }
}

#[tokio::test]
async fn bullish_fill_is_bounded_by_cash_at_a_flat_price() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let mut backtester = Backtester::new(
        orchestrator_with_prices(false, twenty),
        vec![aapl()],
        vec![day],
        dec!(1000),
        RunConfig::default(),
    );

    let report = backtester.run().await.unwrap();
    let portfolio = backtester.portfolio().unwrap();
    let quantity = portfolio.position(&aapl()).unwrap().long;

    assert_eq!(report.trades_executed, 1);
    assert!((1..=50).contains(&quantity));
    assert_eq!(portfolio.cash(), dec!(1000) - dec!(20) * Decimal::from(quantity));
    assert_eq!(report.valuations[0].cash, portfolio.cash());
    assert!(portfolio.cash() >= Decimal::ZERO);
    assert_eq!(report.final_value, dec!(1000));
}

#[tokio::test]
async fn bullish_backtest_buys_and_tracks_the_rising_price() {
    let dates = week();
    let mut backtester = Backtester::new(orchestrator(false), vec![aapl()], dates.clone(), dec!(10000), RunConfig::default());

    let report = backtester.run().await.unwrap();

    assert_eq!(backtester.state(), BacktestState::Completed);
    assert_eq!(report.trading_days, dates.len());
    assert_eq!(report.valuations.len(), dates.len());
    assert!(report.trades_executed >= 1);
    assert!(report.fault_log.is_empty());
    assert!(report.final_value > dec!(10000));
    assert_eq!(report.max_drawdown, Decimal::ZERO);

    let portfolio = backtester.portfolio().unwrap();
    assert!(portfolio.cash() >= Decimal::ZERO);
    assert!(portfolio.position(&aapl()).unwrap().long > 0);
    for point in &report.valuations {
        assert!(point.cash >= Decimal::ZERO);
    }
    // Marked at the close of the last date.
    let last = dates.last().copied().unwrap();
    let long = Decimal::from(portfolio.position(&aapl()).unwrap().long);
    assert_eq!(report.final_value, portfolio.cash() + long * close_on(last));
}

#[tokio::test]
async fn analyst_faults_are_logged_and_the_loop_continues() {
    let dates = week();
    let mut backtester = Backtester::new(orchestrator(true), vec![aapl()], dates.clone(), dec!(10000), RunConfig::default());

    let report = backtester.run().await.unwrap();

    assert_eq!(report.valuations.len(), dates.len());
    assert_eq!(report.fault_log.len(), dates.len());
    assert!(report.fault_log.iter().all(|f| f.node.as_deref() == Some("trend")));
    assert_eq!(report.trades_executed, 0);
    assert_eq!(report.final_value, dec!(10000));
}

#[tokio::test]
async fn uncovered_instrument_holds_every_day() {
    let dates = week();
    let hk = Instrument::new("0700", Market::HongKong);
    let mut backtester = Backtester::new(orchestrator(false), vec![hk], dates.clone(), dec!(5000), RunConfig::default());

    let report = backtester.run().await.unwrap();
    assert_eq!(report.trades_executed, 0);
    assert!(report.valuations.iter().all(|v| v.total_value == dec!(5000)));
}

#[tokio::test]
async fn submitted_backtest_streams_events_and_writes_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join("week.json");

    let mut handle = submit_backtest(&orchestrator(false), vec![aapl()], week(), dec!(10000), RunConfig::default());
    let mut completed = 0;
    while let Some(event) = handle.next_event().await {
        if event.phase == events::Phase::Completed && event.node_id == engine::AGGREGATOR_NODE_ID {
            completed += 1;
        }
    }
    let status = handle.status().clone();
    let report = handle.report().await.unwrap();

    assert_eq!(completed, week().len());
    assert!(status.all_settled());

    write_report(&report, &path).unwrap();
    assert_eq!(read_report(&path).unwrap(), report);
}
