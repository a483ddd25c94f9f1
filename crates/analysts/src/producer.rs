use crate::error::AnalystError;
use crate::params::ParamMap;
use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{DataSet, FieldSet, Instrument, SignalResult};
use std::collections::BTreeMap;

/// What an analyst needs fetched before it can evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequirements {
    /// One entry per data domain the analyst reads.
    pub fields: Vec<FieldSet>,
    /// Calendar days of history. `None` uses the run's default lookback.
    pub lookback_days: Option<u32>,
}

/// The signals of a node's declared upstream set, keyed by node identity.
///
/// A node only ever sees the results of the nodes it declared as upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamSignals(BTreeMap<String, SignalResult>);

impl UpstreamSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: impl Into<String>, signal: SignalResult) {
        self.0.insert(node_id.into(), signal);
    }

    pub fn get(&self, node_id: &str) -> Option<&SignalResult> {
        self.0.get(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SignalResult)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, SignalResult)> for UpstreamSignals {
    fn from_iter<T: IntoIterator<Item = (String, SignalResult)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-run inputs that are not market data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub as_of: NaiveDate,
    /// The model selected for this node, for analysts that consult one.
    pub model: Option<String>,
    /// Parameter overrides for this node.
    pub overrides: ParamMap,
}

impl EvaluationContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            model: None,
            overrides: ParamMap::new(),
        }
    }
}

/// The core trait that all analysts must implement.
///
/// Analysts are shared by every concurrent pipeline, so `evaluate` takes `&self`
/// and must not keep per-call state. The `Send + Sync` bounds let one instance
/// serve many instruments at once.
#[async_trait]
pub trait SignalProducer: Send + Sync {
    /// Stable identity of the analyst. Used as the graph node id and cache key.
    fn id(&self) -> &str;

    /// The data this analyst consumes.
    fn requirements(&self) -> DataRequirements;

    /// Forms a view on `instrument` from `data` and the upstream signals.
    ///
    /// # Returns
    ///
    /// * `Ok(SignalResult)` - the analyst's stance, confidence and rationale.
    /// * `Err(AnalystError::DataUnavailable)` - the data needed is missing; the caller
    ///   substitutes a neutral signal.
    /// * `Err(_)` - any other failure, recorded as a hard fault for this node.
    async fn evaluate(
        &self,
        instrument: &Instrument,
        data: &DataSet,
        upstream: &UpstreamSignals,
        context: &EvaluationContext,
    ) -> Result<SignalResult, AnalystError>;
}
