use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::Instrument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle step a node reached for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Started,
    /// The node's data was unavailable and a neutral stand-in signal was used.
    Substituted,
    Completed,
    Failed,
}

impl Phase {
    /// True once the node will emit nothing further for this instrument.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Phase::Started)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Started => "started",
            Phase::Substituted => "substituted",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A single progress notification.
///
/// Serialized as a flat JSON object, e.g.
/// `{"node_id":"technicals","instrument":{...},"phase":"completed","label":"Done",...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub node_id: String,
    pub instrument: Instrument,
    pub phase: Phase,
    /// Short human-readable status, e.g. "Fetching prices" or "Done".
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        node_id: impl Into<String>,
        instrument: Instrument,
        phase: Phase,
        label: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            instrument,
            phase,
            label: label.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}
