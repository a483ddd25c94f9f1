use crate::error::EngineError;
use crate::orchestrator::{Orchestrator, RunOutcome, RunRequest};
use events::{ChannelPublisher, EventPublisher, Fanout, ProgressEvent, StatusBoard};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument as _;
use uuid::Uuid;

/// A run executing in the background.
///
/// Progress can be followed through `next_event` or polled through `status`; the
/// outcome is collected with `result`. Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    status: StatusBoard,
    task: JoinHandle<Result<RunOutcome, EngineError>>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The next progress event, or `None` once the run has finished and every event
    /// has been received.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// The latest phase of every node and instrument seen so far.
    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the run. In-flight provider calls are dropped, and `result` reports
    /// `EngineError::Cancelled`.
    pub fn cancel(&self) {
        tracing::info!(run_id = %self.id, "Cancelling run.");
        self.task.abort();
    }

    /// Waits for the run to finish.
    pub async fn result(self) -> Result<RunOutcome, EngineError> {
        self.task.await?
    }
}

impl Orchestrator {
    /// Starts `request` on the runtime and returns immediately.
    pub fn submit_run(&self, request: RunRequest) -> RunHandle {
        let id = Uuid::new_v4();
        let status = StatusBoard::new();
        let (channel, events) = ChannelPublisher::new();
        let publisher: Arc<dyn EventPublisher> = Arc::new(
            Fanout::new()
                .with(Arc::new(channel))
                .with(Arc::new(status.clone())),
        );

        let span = tracing::info_span!("run", run_id = %id, as_of = %request.as_of);
        let orchestrator = self.clone();
        let task = tokio::spawn(async move { orchestrator.run(request, publisher).await }.instrument(span));

        RunHandle {
            id,
            events,
            status,
            task,
        }
    }
}
