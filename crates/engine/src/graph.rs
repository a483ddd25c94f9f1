use crate::error::GraphError;
use analysts::SignalProducer;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Identity of the risk constraint node in graphs built by `ExecutionGraph::standard`.
pub const RISK_NODE_ID: &str = "risk";
/// Identity of the decision aggregator node in graphs built by `ExecutionGraph::standard`.
pub const AGGREGATOR_NODE_ID: &str = "portfolio";

/// What a node does when it is scheduled.
#[derive(Clone)]
pub enum NodeRole {
    Analyst(Arc<dyn SignalProducer>),
    /// Evaluates position limits from prices and the portfolio. Takes no upstream input.
    Risk,
    /// Turns upstream signals and the risk assessment into the instrument's decision.
    Aggregator,
}

impl NodeRole {
    pub fn label(&self) -> &'static str {
        match self {
            NodeRole::Analyst(_) => "analyst",
            NodeRole::Risk => "risk",
            NodeRole::Aggregator => "aggregator",
        }
    }
}

impl fmt::Debug for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Analyst(producer) => f.debug_tuple("Analyst").field(&producer.id()).finish(),
            NodeRole::Risk => f.write_str("Risk"),
            NodeRole::Aggregator => f.write_str("Aggregator"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionNode {
    pub id: String,
    pub role: NodeRole,
    /// Identities of the nodes whose output this node reads, in declaration order.
    pub upstream: Vec<String>,
}

impl ExecutionNode {
    pub fn analyst(producer: Arc<dyn SignalProducer>, upstream: Vec<String>) -> Self {
        Self {
            id: producer.id().to_string(),
            role: NodeRole::Analyst(producer),
            upstream,
        }
    }

    pub fn risk(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: NodeRole::Risk,
            upstream: Vec::new(),
        }
    }

    pub fn aggregator(id: impl Into<String>, upstream: Vec<String>) -> Self {
        Self {
            id: id.into(),
            role: NodeRole::Aggregator,
            upstream,
        }
    }
}

/// The schedule computed when the graph freezes. Indices refer to registration order.
#[derive(Debug)]
pub(crate) struct Plan {
    pub order: Vec<usize>,
    pub upstream: Vec<Vec<usize>>,
    pub dependents: Vec<Vec<usize>>,
}

/// A DAG of analysts feeding a risk node and a single aggregator.
///
/// Nodes may name upstream identities that are registered later; `validate` reports
/// any still missing. The first call to `topological_order` freezes the graph, after
/// which it is read concurrently without locking.
#[derive(Debug, Default)]
pub struct ExecutionGraph {
    nodes: Vec<ExecutionNode>,
    index: HashMap<String, usize>,
    plan: OnceLock<Plan>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the usual shape: every analyst with its declared upstream, a risk node
    /// with none, and an aggregator reading all analysts plus risk.
    pub fn standard(
        analysts: Vec<(Arc<dyn SignalProducer>, Vec<String>)>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        let mut aggregator_inputs = Vec::with_capacity(analysts.len() + 1);
        for (producer, upstream) in analysts {
            aggregator_inputs.push(producer.id().to_string());
            graph.register(ExecutionNode::analyst(producer, upstream))?;
        }
        graph.register(ExecutionNode::risk(RISK_NODE_ID))?;
        aggregator_inputs.push(RISK_NODE_ID.to_string());
        graph.register(ExecutionNode::aggregator(AGGREGATOR_NODE_ID, aggregator_inputs))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Adds a node. On error the graph is left exactly as it was.
    pub fn register(&mut self, node: ExecutionNode) -> Result<(), GraphError> {
        if self.plan.get().is_some() {
            return Err(GraphError::Frozen);
        }
        if self.index.contains_key(&node.id) {
            return Err(GraphError::Duplicate(node.id));
        }
        if let Some(path) = self.path_back_to(&node) {
            return Err(GraphError::Cycle {
                node: node.id,
                path,
            });
        }

        tracing::debug!(node = %node.id, role = node.role.label(), upstream = ?node.upstream, "Node registered.");
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Searches from the new node's upstream set for an existing node that already
    /// names the new node as upstream. Returns the cycle path if one is found.
    fn path_back_to(&self, node: &ExecutionNode) -> Option<Vec<String>> {
        let mut stack: Vec<(String, Vec<String>)> = node
            .upstream
            .iter()
            .map(|u| (u.clone(), vec![node.id.clone(), u.clone()]))
            .collect();
        let mut seen = BTreeSet::new();

        while let Some((current, path)) = stack.pop() {
            if current == node.id {
                return Some(path);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(&i) = self.index.get(&current) {
                for next in &self.nodes[i].upstream {
                    let mut extended = path.clone();
                    extended.push(next.clone());
                    stack.push((next.clone(), extended));
                }
            }
        }
        None
    }

    /// Checks that every upstream is registered and that the graph has the shape the
    /// orchestrator can run: one risk node, one aggregator that is a sink and reads the
    /// risk node, and analysts that only read other analysts.
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for upstream in &node.upstream {
                if !self.index.contains_key(upstream) {
                    return Err(GraphError::Dangling {
                        node: node.id.clone(),
                        upstream: upstream.clone(),
                    });
                }
            }
        }

        let aggregators: Vec<&ExecutionNode> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.role, NodeRole::Aggregator))
            .collect();
        let risks: Vec<&ExecutionNode> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.role, NodeRole::Risk))
            .collect();
        let [aggregator] = aggregators.as_slice() else {
            return Err(GraphError::AggregatorCount(aggregators.len()));
        };
        let [risk] = risks.as_slice() else {
            return Err(GraphError::RiskCount(risks.len()));
        };

        if let Some(downstream) = self.nodes.iter().find(|n| n.upstream.contains(&aggregator.id)) {
            return Err(GraphError::AggregatorNotSink {
                aggregator: aggregator.id.clone(),
                downstream: downstream.id.clone(),
            });
        }
        if !aggregator.upstream.contains(&risk.id) {
            return Err(GraphError::MissingRiskInput(aggregator.id.clone()));
        }
        if let Some(upstream) = risk.upstream.first() {
            return Err(GraphError::InvalidEdge {
                node: risk.id.clone(),
                upstream: upstream.clone(),
                reason: "the risk node takes no upstream input".to_string(),
            });
        }
        for node in self.nodes.iter().filter(|n| matches!(n.role, NodeRole::Analyst(_))) {
            if node.upstream.contains(&risk.id) {
                return Err(GraphError::InvalidEdge {
                    node: node.id.clone(),
                    upstream: risk.id.clone(),
                    reason: "analysts read signals, not risk assessments".to_string(),
                });
            }
        }
        Ok(())
    }

    /// A total order consistent with every edge, ties broken by registration order.
    ///
    /// The first call freezes the graph.
    pub fn topological_order(&self) -> Vec<&str> {
        self.plan()
            .order
            .iter()
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    pub fn is_frozen(&self) -> bool {
        self.plan.get().is_some()
    }

    pub(crate) fn plan(&self) -> &Plan {
        self.plan.get_or_init(|| self.compute_plan())
    }

    /// Kahn's algorithm over registered edges, always taking the lowest ready index.
    /// Unregistered upstream names are ignored here; `validate` reports them.
    fn compute_plan(&self) -> Plan {
        let upstream: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .map(|n| {
                let mut indices: Vec<usize> =
                    n.upstream.iter().filter_map(|u| self.index.get(u).copied()).collect();
                indices.sort_unstable();
                indices.dedup();
                indices
            })
            .collect();
        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (i, ups) in upstream.iter().enumerate() {
            for &u in ups {
                dependents[u].push(i);
            }
        }

        let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &d in &dependents[next] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        tracing::debug!(nodes = order.len(), "Execution graph frozen.");
        Plan {
            order,
            upstream,
            dependents,
        }
    }

    pub fn node(&self, id: &str) -> Option<&ExecutionNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub(crate) fn node_at(&self, index: usize) -> &ExecutionNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[ExecutionNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysts::{Fundamentals, Sentiment};

    fn fundamentals() -> Arc<dyn SignalProducer> {
        Arc::new(Fundamentals)
    }

    #[test]
    fn standard_graph_orders_analysts_before_sinks() {
        let graph = ExecutionGraph::standard(vec![
            (fundamentals(), Vec::new()),
            (Arc::new(Sentiment::default()), vec!["fundamentals".to_string()]),
        ])
        .unwrap();
        assert_eq!(
            graph.topological_order(),
            vec!["fundamentals", "sentiment", RISK_NODE_ID, AGGREGATOR_NODE_ID]
        );
        assert!(graph.is_frozen());
    }

    #[test]
    fn ties_follow_registration_order() {
        let mut graph = ExecutionGraph::new();
        graph.register(ExecutionNode::risk("r")).unwrap();
        graph
            .register(ExecutionNode::aggregator("agg", vec!["b".into(), "r".into()]))
            .unwrap();
        graph.register(ExecutionNode::analyst(fundamentals(), Vec::new())).unwrap();
        // "b" is referenced but never registered.
        assert_eq!(
            graph.validate(),
            Err(GraphError::Dangling {
                node: "agg".into(),
                upstream: "b".into()
            })
        );
        assert_eq!(graph.topological_order(), vec!["r", "agg", "fundamentals"]);
    }

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut graph = ExecutionGraph::new();
        graph
            .register(ExecutionNode::aggregator("a", vec!["b".into()]))
            .unwrap();
        let err = graph
            .register(ExecutionNode::aggregator("b", vec!["a".into()]))
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
        assert_eq!(graph.len(), 1);
        assert!(graph.node("b").is_none());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = ExecutionGraph::new();
        let node = ExecutionNode {
            id: "r".into(),
            role: NodeRole::Risk,
            upstream: vec!["r".into()],
        };
        let err = graph.register(node).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                node: "r".into(),
                path: vec!["r".into(), "r".into()]
            }
        );
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut graph = ExecutionGraph::new();
        graph.register(ExecutionNode::risk("r")).unwrap();
        assert_eq!(
            graph.register(ExecutionNode::risk("r")),
            Err(GraphError::Duplicate("r".into()))
        );
    }

    #[test]
    fn frozen_graph_rejects_registration() {
        let mut graph = ExecutionGraph::new();
        graph.register(ExecutionNode::risk("r")).unwrap();
        let _ = graph.topological_order();
        assert_eq!(
            graph.register(ExecutionNode::aggregator("agg", vec!["r".into()])),
            Err(GraphError::Frozen)
        );
    }

    #[test]
    fn aggregator_must_be_a_sink_and_read_risk() {
        let mut graph = ExecutionGraph::new();
        graph.register(ExecutionNode::risk("r")).unwrap();
        graph.register(ExecutionNode::aggregator("agg", Vec::new())).unwrap();
        assert_eq!(graph.validate(), Err(GraphError::MissingRiskInput("agg".into())));

        let mut graph = ExecutionGraph::new();
        graph.register(ExecutionNode::risk("r")).unwrap();
        graph
            .register(ExecutionNode::aggregator("agg", vec!["r".into()]))
            .unwrap();
        graph
            .register(ExecutionNode::analyst(fundamentals(), vec!["agg".into()]))
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::AggregatorNotSink { .. })));
    }
}
