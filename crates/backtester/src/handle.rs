use crate::backtester::Backtester;
use crate::error::BacktestError;
use analytics::PerformanceReport;
use chrono::NaiveDate;
use configuration::RunConfig;
use core_types::Instrument;
use engine::Orchestrator;
use events::{ChannelPublisher, EventPublisher, Fanout, ProgressEvent, StatusBoard};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument as _;
use uuid::Uuid;

/// A backtest executing in the background.
#[derive(Debug)]
pub struct BacktestHandle {
    id: Uuid,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    status: StatusBoard,
    task: JoinHandle<Result<PerformanceReport, BacktestError>>,
}

impl BacktestHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The next progress event of any step, or `None` once the backtest has finished
    /// and every event has been received.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Latest phase per node and instrument, across all steps so far.
    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        tracing::info!(backtest_id = %self.id, "Cancelling backtest.");
        self.task.abort();
    }

    /// Waits for the backtest and returns its report.
    pub async fn report(self) -> Result<PerformanceReport, BacktestError> {
        self.task.await?
    }
}

/// Starts a backtest on the runtime and returns immediately.
pub fn submit_backtest(
    orchestrator: &Orchestrator,
    instruments: Vec<Instrument>,
    dates: Vec<NaiveDate>,
    initial_cash: Decimal,
    config: RunConfig,
) -> BacktestHandle {
    let id = Uuid::new_v4();
    let status = StatusBoard::new();
    let (channel, events) = ChannelPublisher::new();
    let publisher: Arc<dyn EventPublisher> = Arc::new(
        Fanout::new()
            .with(Arc::new(channel))
            .with(Arc::new(status.clone())),
    );

    let mut backtester = Backtester::new(orchestrator.clone(), instruments, dates, initial_cash, config)
        .with_publisher(publisher);
    let span = tracing::info_span!("backtest", backtest_id = %id);
    let task = tokio::spawn(async move { backtester.run().await }.instrument(span));

    BacktestHandle {
        id,
        events,
        status,
        task,
    }
}
