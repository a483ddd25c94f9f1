use crate::aggregator::Aggregator;
use crate::error::EngineError;
use crate::graph::{ExecutionGraph, NodeRole};
use analysts::{AnalystError, DataRequirements, EvaluationContext, SignalProducer, UpstreamSignals};
use chrono::NaiveDate;
use configuration::RunConfig;
use core_types::{
    DataDomain, DataSet, DateRange, Decision, FieldSet, Instrument, PortfolioSnapshot, SignalResult,
};
use events::{EventPublisher, Phase, ProgressEvent};
use futures::stream::{FuturesUnordered, StreamExt};
use providers::{ProviderError, ProviderRegistry};
use risk::{RiskAssessment, RiskEvaluator, VolatilityAdjustedLimits};
use rust_decimal::Decimal;
use signal_cache::{CacheError, CacheKey, Fingerprint, FingerprintBuilder, SignalCache};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;

/// One pass of the pipeline over a set of instruments at one as-of date.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub instruments: Vec<Instrument>,
    pub as_of: NaiveDate,
    /// The portfolio the risk node and aggregator size against.
    pub portfolio: PortfolioSnapshot,
    pub config: RunConfig,
}

impl RunRequest {
    pub fn new(
        instruments: Vec<Instrument>,
        as_of: NaiveDate,
        portfolio: PortfolioSnapshot,
        config: RunConfig,
    ) -> Self {
        Self {
            instruments,
            as_of,
            portfolio,
            config,
        }
    }
}

/// A node that failed hard for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFault {
    pub node: String,
    pub message: String,
}

/// Everything the pipeline produced for one instrument.
#[derive(Debug, Clone, Default)]
pub struct InstrumentOutcome {
    pub signals: BTreeMap<String, SignalResult>,
    /// Analysts whose signal is a neutral stand-in for unavailable data.
    pub substituted: BTreeSet<String>,
    pub risk: Option<RiskAssessment>,
    /// `None` when the aggregator faulted.
    pub decision: Option<Decision>,
    pub faults: Vec<NodeFault>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub as_of: NaiveDate,
    pub instruments: BTreeMap<Instrument, InstrumentOutcome>,
}

impl RunOutcome {
    /// The decisions that were produced, in instrument order.
    pub fn decisions(&self) -> impl Iterator<Item = &Decision> {
        self.instruments.values().filter_map(|o| o.decision.as_ref())
    }

    pub fn decision(&self, instrument: &Instrument) -> Option<&Decision> {
        self.instruments.get(instrument)?.decision.as_ref()
    }

    /// The close the risk node priced the instrument at, if it found one.
    pub fn closing_price(&self, instrument: &Instrument) -> Option<Decimal> {
        self.instruments.get(instrument)?.risk.as_ref()?.current_price
    }
}

/// Why an analyst produced no cached signal.
#[derive(Debug)]
enum NodeFailure {
    /// Recovered by a neutral substitute.
    Unavailable(String),
    Hard(String),
    Cache(CacheError),
}

impl From<CacheError> for NodeFailure {
    fn from(err: CacheError) -> Self {
        NodeFailure::Cache(err)
    }
}

impl From<AnalystError> for NodeFailure {
    fn from(err: AnalystError) -> Self {
        match err {
            AnalystError::DataUnavailable(reason) => NodeFailure::Unavailable(reason),
            other => NodeFailure::Hard(other.to_string()),
        }
    }
}

impl From<ProviderError> for NodeFailure {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::DataUnavailable(_) | ProviderError::NoChain { .. } => {
                NodeFailure::Unavailable(err.to_string())
            }
            other => NodeFailure::Hard(other.to_string()),
        }
    }
}

/// What a finished node hands downstream.
#[derive(Debug, Clone)]
enum NodeOutput {
    Signal(SignalResult),
    Risk(RiskAssessment),
}

enum NodeResult {
    Signal { signal: SignalResult, substituted: bool },
    Risk { assessment: RiskAssessment, substituted: bool },
    Decision(Decision),
    Failed(String),
    Fatal(EngineError),
}

/// Read-only state shared by every instrument of one run.
struct RunContext {
    as_of: NaiveDate,
    portfolio: PortfolioSnapshot,
    config: RunConfig,
    risk: VolatilityAdjustedLimits,
    publisher: Arc<dyn EventPublisher>,
}

impl RunContext {
    fn emit(&self, node: &str, instrument: &Instrument, phase: Phase, label: impl Into<String>) {
        self.publisher
            .publish(ProgressEvent::new(node, instrument.clone(), phase, label));
    }
}

/// Schedules the frozen graph for every instrument of a run.
///
/// Cloning is cheap; clones share the graph, providers and cache.
#[derive(Clone)]
pub struct Orchestrator {
    graph: Arc<ExecutionGraph>,
    registry: Arc<ProviderRegistry>,
    cache: Arc<SignalCache>,
    aggregator: Aggregator,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("nodes", &self.graph.topological_order())
            .field("cache", &self.cache)
            .field("aggregator", &self.aggregator)
            .finish()
    }
}

impl Orchestrator {
    /// Validates and freezes `graph`.
    pub fn new(
        graph: ExecutionGraph,
        registry: Arc<ProviderRegistry>,
        cache: Arc<SignalCache>,
    ) -> Result<Self, EngineError> {
        graph.validate()?;
        let order = graph.topological_order();
        tracing::info!(nodes = ?order, "Orchestrator ready.");
        Ok(Self {
            graph: Arc::new(graph),
            registry,
            cache,
            aggregator: Aggregator::default(),
        })
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<SignalCache> {
        &self.cache
    }

    /// Runs the pipeline for every distinct instrument of `request` concurrently.
    ///
    /// A fault in one instrument's pipeline never affects another; the instrument is
    /// reported with its faults and no decision. Configuration errors fail the run before
    /// any work starts, and cache corruption fails it outright.
    pub async fn run(
        &self,
        request: RunRequest,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<RunOutcome, EngineError> {
        let risk = VolatilityAdjustedLimits::new(request.config.risk.clone())
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        let instruments: BTreeSet<Instrument> = request.instruments.into_iter().collect();
        let context = Arc::new(RunContext {
            as_of: request.as_of,
            portfolio: request.portfolio,
            config: request.config,
            risk,
            publisher,
        });
        tracing::info!(as_of = %context.as_of, instruments = instruments.len(), "Run started.");

        let mut tasks = JoinSet::new();
        let mut by_task = HashMap::new();
        for instrument in instruments {
            let orchestrator = self.clone();
            let context = Arc::clone(&context);
            let task_instrument = instrument.clone();
            let handle = tasks.spawn(async move {
                orchestrator.run_instrument(&context, &task_instrument).await
            });
            by_task.insert(handle.id(), instrument);
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    let outcome = result?;
                    if let Some(instrument) = by_task.remove(&id) {
                        outcomes.insert(instrument, outcome);
                    }
                }
                Err(err) => {
                    let Some(instrument) = by_task.remove(&err.id()) else {
                        continue;
                    };
                    if err.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    tracing::error!(instrument = %instrument, error = %err, "Instrument pipeline panicked.");
                    outcomes.insert(
                        instrument,
                        InstrumentOutcome {
                            faults: vec![NodeFault {
                                node: "pipeline".to_string(),
                                message: format!("pipeline panicked: {}", err),
                            }],
                            ..Default::default()
                        },
                    );
                }
            }
        }

        let decided = outcomes.values().filter(|o| o.decision.is_some()).count();
        tracing::info!(as_of = %context.as_of, instruments = outcomes.len(), decided, "Run finished.");
        Ok(RunOutcome {
            as_of: context.as_of,
            instruments: outcomes,
        })
    }

    /// Drives one instrument through the graph: every node starts as soon as its whole
    /// upstream set has resolved, and ready nodes run concurrently.
    async fn run_instrument(
        &self,
        context: &RunContext,
        instrument: &Instrument,
    ) -> Result<InstrumentOutcome, EngineError> {
        let plan = self.graph.plan();
        let mut pending: Vec<usize> = plan.upstream.iter().map(Vec::len).collect();
        let mut outputs: Vec<Option<NodeOutput>> = vec![None; pending.len()];
        let mut outcome = InstrumentOutcome::default();

        let mut ready: Vec<usize> = plan.order.iter().copied().filter(|&i| pending[i] == 0).collect();
        let mut running = FuturesUnordered::new();
        loop {
            for index in ready.drain(..) {
                let (signals, risk) = self.gather_inputs(index, &outputs);
                running.push(self.run_node(index, context, instrument, signals, risk));
            }
            let Some((index, result)) = running.next().await else {
                break;
            };
            let node_id = self.graph.node_at(index).id.clone();

            match result {
                NodeResult::Signal { signal, substituted } => {
                    if substituted {
                        outcome.substituted.insert(node_id.clone());
                    }
                    outcome.signals.insert(node_id, signal.clone());
                    outputs[index] = Some(NodeOutput::Signal(signal));
                }
                NodeResult::Risk { assessment, .. } => {
                    outcome.risk = Some(assessment.clone());
                    outputs[index] = Some(NodeOutput::Risk(assessment));
                }
                NodeResult::Decision(decision) => outcome.decision = Some(decision),
                NodeResult::Failed(message) => outcome.faults.push(NodeFault {
                    node: node_id,
                    message,
                }),
                NodeResult::Fatal(err) => return Err(err),
            }

            for &dependent in &plan.dependents[index] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }
        Ok(outcome)
    }

    /// Collects the outputs of a node's declared upstream set, and nothing else.
    fn gather_inputs(
        &self,
        index: usize,
        outputs: &[Option<NodeOutput>],
    ) -> (UpstreamSignals, Option<RiskAssessment>) {
        let mut signals = UpstreamSignals::new();
        let mut risk = None;
        for &upstream in &self.graph.plan().upstream[index] {
            match &outputs[upstream] {
                Some(NodeOutput::Signal(signal)) => {
                    signals.insert(self.graph.node_at(upstream).id.clone(), signal.clone());
                }
                Some(NodeOutput::Risk(assessment)) => risk = Some(assessment.clone()),
                None => {}
            }
        }
        (signals, risk)
    }

    async fn run_node(
        &self,
        index: usize,
        context: &RunContext,
        instrument: &Instrument,
        signals: UpstreamSignals,
        risk: Option<RiskAssessment>,
    ) -> (usize, NodeResult) {
        let node = self.graph.node_at(index);
        context.emit(&node.id, instrument, Phase::Started, "Running");

        let result = match &node.role {
            NodeRole::Analyst(producer) => {
                self.run_analyst(producer, context, instrument, signals).await
            }
            NodeRole::Risk => self.run_risk(context, instrument).await,
            NodeRole::Aggregator => self.run_aggregator(&node.id, context, instrument, &signals, risk),
        };

        match &result {
            NodeResult::Signal { substituted: false, .. }
            | NodeResult::Risk { substituted: false, .. }
            | NodeResult::Decision(_) => {
                context.emit(&node.id, instrument, Phase::Completed, "Done");
            }
            NodeResult::Signal { substituted: true, signal } => {
                context.emit(&node.id, instrument, Phase::Substituted, signal.rationale.clone());
            }
            NodeResult::Risk { substituted: true, assessment } => {
                context.emit(&node.id, instrument, Phase::Substituted, assessment.rationale.clone());
            }
            NodeResult::Failed(message) => {
                context.emit(&node.id, instrument, Phase::Failed, message.clone());
            }
            NodeResult::Fatal(err) => {
                context.emit(&node.id, instrument, Phase::Failed, err.to_string());
            }
        }
        (index, result)
    }

    async fn run_analyst(
        &self,
        producer: &Arc<dyn SignalProducer>,
        context: &RunContext,
        instrument: &Instrument,
        upstream: UpstreamSignals,
    ) -> NodeResult {
        let node_id = producer.id();
        let requirements = producer.requirements();
        let range = match DateRange::lookback(
            context.as_of,
            requirements.lookback_days.unwrap_or(context.config.lookback_days),
        ) {
            Ok(range) => range,
            Err(err) => return NodeResult::Fatal(EngineError::Configuration(err.to_string())),
        };
        let evaluation = EvaluationContext {
            as_of: context.as_of,
            model: context.config.model_for(node_id).map(str::to_string),
            overrides: context.config.overrides_for(node_id),
        };
        let fingerprint = match fingerprint(&requirements, &range, &evaluation, &upstream) {
            Ok(fingerprint) => fingerprint,
            Err(err) => return NodeResult::Failed(format!("cannot fingerprint inputs: {}", err)),
        };
        let key = CacheKey::new(node_id, instrument.clone(), fingerprint);

        let computed = self
            .cache
            .get_or_compute(&key, || async {
                let data = self.fetch_all(instrument, &requirements.fields, &range).await?;
                let signal = producer
                    .evaluate(instrument, &data, &upstream, &evaluation)
                    .await?;
                Ok::<_, NodeFailure>(signal)
            })
            .await;

        match computed {
            Ok(signal) => NodeResult::Signal {
                signal,
                substituted: false,
            },
            Err(NodeFailure::Unavailable(reason)) => {
                tracing::warn!(node = %node_id, instrument = %instrument, %reason, "Data unavailable; substituting a neutral signal.");
                NodeResult::Signal {
                    signal: SignalResult::neutral_substitute(node_id, context.as_of, &reason),
                    substituted: true,
                }
            }
            Err(NodeFailure::Hard(message)) => {
                tracing::warn!(node = %node_id, instrument = %instrument, error = %message, "Analyst failed.");
                NodeResult::Failed(message)
            }
            Err(NodeFailure::Cache(err)) => {
                tracing::error!(node = %node_id, instrument = %instrument, error = %err, "Signal cache corrupted.");
                NodeResult::Fatal(EngineError::Cache(err))
            }
        }
    }

    /// Fetches every field set and merges them into one dataset. Any unavailable
    /// domain makes the whole request unavailable.
    async fn fetch_all(
        &self,
        instrument: &Instrument,
        fields: &[FieldSet],
        range: &DateRange,
    ) -> Result<DataSet, NodeFailure> {
        let mut data = DataSet::default();
        for field_set in fields {
            let fetched = self.registry.fetch(instrument, field_set, range).await?;
            data.merge(fetched);
        }
        Ok(data)
    }

    async fn run_risk(&self, context: &RunContext, instrument: &Instrument) -> NodeResult {
        let volatility_days = u32::try_from(context.config.risk.volatility_lookback_days).unwrap_or(u32::MAX);
        let lookback = (volatility_days.saturating_mul(3) / 2 + 10).max(context.config.lookback_days);
        let range = match DateRange::lookback(context.as_of, lookback) {
            Ok(range) => range,
            Err(err) => return NodeResult::Fatal(EngineError::Configuration(err.to_string())),
        };

        let prices = match self
            .registry
            .fetch(instrument, &FieldSet::all(DataDomain::Prices), &range)
            .await
            .map_err(NodeFailure::from)
        {
            Ok(data) => data.prices,
            Err(NodeFailure::Unavailable(reason)) => {
                tracing::warn!(instrument = %instrument, %reason, "No prices for risk evaluation; nothing may be traded.");
                return NodeResult::Risk {
                    assessment: RiskAssessment::unpriced(format!("Data unavailable: {}", reason)),
                    substituted: true,
                };
            }
            Err(NodeFailure::Hard(message)) => return NodeResult::Failed(message),
            Err(NodeFailure::Cache(err)) => return NodeResult::Fatal(EngineError::Cache(err)),
        };

        match context
            .risk
            .assess(instrument, &prices, context.as_of, &context.portfolio)
        {
            Ok(assessment) => NodeResult::Risk {
                substituted: assessment.current_price.is_none(),
                assessment,
            },
            Err(err) => NodeResult::Failed(err.to_string()),
        }
    }

    fn run_aggregator(
        &self,
        node_id: &str,
        context: &RunContext,
        instrument: &Instrument,
        signals: &UpstreamSignals,
        risk: Option<RiskAssessment>,
    ) -> NodeResult {
        let Some(risk) = risk else {
            let err = EngineError::Aggregation {
                instrument: instrument.clone(),
                reason: "no risk assessment is available".to_string(),
            };
            tracing::error!(node = %node_id, instrument = %instrument, error = %err, "Aggregation failed.");
            return NodeResult::Failed(err.to_string());
        };

        match self.aggregator.decide(
            instrument,
            signals,
            &risk,
            &context.portfolio,
            &context.config.aggregator,
        ) {
            Ok(decision) => {
                tracing::info!(
                    instrument = %instrument,
                    action = %decision.action,
                    quantity = decision.quantity,
                    confidence = %decision.confidence,
                    "Decision made."
                );
                NodeResult::Decision(decision)
            }
            Err(reason) => {
                let err = EngineError::Aggregation {
                    instrument: instrument.clone(),
                    reason,
                };
                tracing::error!(node = %node_id, instrument = %instrument, error = %err, "Aggregation failed.");
                NodeResult::Failed(err.to_string())
            }
        }
    }
}

/// Hashes everything an analyst's output depends on besides the node and instrument:
/// the data window, the field sets, the model, the overrides and the upstream signals.
fn fingerprint(
    requirements: &DataRequirements,
    range: &DateRange,
    evaluation: &EvaluationContext,
    upstream: &UpstreamSignals,
) -> Result<Fingerprint, serde_json::Error> {
    let fields: Vec<String> = requirements.fields.iter().map(ToString::to_string).collect();
    let upstream: BTreeMap<&String, &SignalResult> = upstream.iter().collect();
    Ok(FingerprintBuilder::new()
        .field("as_of", evaluation.as_of)
        .field("range", range)
        .field("fields", fields.join(";"))
        .field("model", evaluation.model.as_deref().unwrap_or("-"))
        .json("overrides", &evaluation.overrides)?
        .json("upstream", &upstream)?
        .finish())
}
