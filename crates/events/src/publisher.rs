use crate::messages::{Phase, ProgressEvent};
use core_types::Instrument;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// A sink for progress events.
///
/// Implementations must not block: the orchestrator calls `publish` from inside
/// running pipelines.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: ProgressEvent) {}
}

/// Forwards events into an unbounded channel so a consumer can follow a run live.
///
/// The channel is unbounded, so no event is dropped while the receiver exists. Once the
/// receiver is gone, events are silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Progress receiver dropped; event discarded.");
        }
    }
}

/// Keeps the most recent phase and label of every (node, instrument) pair, so a
/// caller can query a run's state without consuming the event stream.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<BTreeMap<(String, Instrument), (Phase, String)>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, Instrument), (Phase, String)>> {
        // A panic while holding the lock cannot leave a map insert half-done.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase_of(&self, node_id: &str, instrument: &Instrument) -> Option<Phase> {
        self.lock()
            .get(&(node_id.to_string(), instrument.clone()))
            .map(|(phase, _)| *phase)
    }

    /// A copy of every tracked status, ordered by node then instrument.
    pub fn snapshot(&self) -> Vec<(String, Instrument, Phase, String)> {
        self.lock()
            .iter()
            .map(|((node, instrument), (phase, label))| {
                (node.clone(), instrument.clone(), *phase, label.clone())
            })
            .collect()
    }

    /// True once every tracked pair has reached a terminal phase.
    pub fn all_settled(&self) -> bool {
        self.lock().values().all(|(phase, _)| phase.is_terminal())
    }
}

impl EventPublisher for StatusBoard {
    fn publish(&self, event: ProgressEvent) {
        self.lock()
            .insert((event.node_id, event.instrument), (event.phase, event.label));
    }
}

/// Delivers every event to each of its sinks in order.
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventPublisher>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventPublisher for Fanout {
    fn publish(&self, event: ProgressEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Market;

    fn event(node: &str, phase: Phase) -> ProgressEvent {
        ProgressEvent::new(node, Instrument::new("AAPL", Market::Us), phase, phase.to_string())
    }

    #[tokio::test]
    async fn channel_publisher_delivers_in_order() {
        let (publisher, mut rx) = ChannelPublisher::new();
        publisher.publish(event("technicals", Phase::Started));
        publisher.publish(event("technicals", Phase::Completed));
        drop(publisher);

        assert_eq!(rx.recv().await.map(|e| e.phase), Some(Phase::Started));
        assert_eq!(rx.recv().await.map(|e| e.phase), Some(Phase::Completed));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn status_board_tracks_latest_phase() {
        let board = StatusBoard::new();
        let aapl = Instrument::new("AAPL", Market::Us);
        board.publish(event("technicals", Phase::Started));
        assert!(!board.all_settled());
        board.publish(event("technicals", Phase::Completed));
        assert_eq!(board.phase_of("technicals", &aapl), Some(Phase::Completed));
        assert!(board.all_settled());
        assert_eq!(board.phase_of("sentiment", &aapl), None);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = StatusBoard::new();
        let b = StatusBoard::new();
        let fanout = Fanout::new()
            .with(Arc::new(a.clone()))
            .with(Arc::new(b.clone()));
        fanout.publish(event("risk", Phase::Failed));
        assert_eq!(a.snapshot().len(), 1);
        assert_eq!(b.snapshot().len(), 1);
    }
}
