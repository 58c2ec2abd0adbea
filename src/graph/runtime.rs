// Graph Runtime - petgraph based
// Type-safe StateGraph execution engine

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::node::{GraphError, Node, NodeContext, NodeOutput, Transition};
use super::state::TurnState;

/// Edge condition for graph routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeCondition {
    /// Always follow this edge (default edge)
    Always,
    /// Follow this edge when the node branches with this transition
    On(Transition),
}

impl EdgeCondition {
    pub fn matches(&self, transition: Option<Transition>) -> bool {
        match (self, transition) {
            (EdgeCondition::Always, None) => true,
            (EdgeCondition::On(expected), Some(actual)) => *expected == actual,
            _ => false,
        }
    }
}

/// petgraph-based StateGraph runtime
pub struct GraphRuntime {
    /// The underlying directed graph
    graph: DiGraph<Box<dyn Node>, EdgeCondition>,
    /// Map from node ID to NodeIndex for lookup
    node_indices: HashMap<String, NodeIndex>,
    /// Nodes allowed to have no outgoing edges
    terminal_nodes: HashSet<String>,
    /// Entry point node ID
    entry_node_id: String,
    /// Maximum execution steps (recursion limit)
    max_steps: usize,
}

impl GraphRuntime {
    fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            terminal_nodes: HashSet::new(),
            entry_node_id: String::new(),
            max_steps: 50,
        }
    }

    fn add_node(&mut self, node: Box<dyn Node>) -> Result<NodeIndex, GraphError> {
        let id = node.id().to_string();
        if self.node_indices.contains_key(&id) {
            return Err(GraphError::new(&id, format!("Duplicate node id: {}", id)));
        }
        let index = self.graph.add_node(node);
        self.node_indices.insert(id, index);
        Ok(index)
    }

    fn add_edge(&mut self, from: &str, to: &str, condition: EdgeCondition) -> Result<(), GraphError> {
        let from_idx = self
            .node_indices
            .get(from)
            .ok_or_else(|| GraphError::new(from, format!("Source node not found: {}", from)))?;
        let to_idx = self
            .node_indices
            .get(to)
            .ok_or_else(|| GraphError::new(to, format!("Target node not found: {}", to)))?;

        let duplicate = self
            .graph
            .edges_directed(*from_idx, Direction::Outgoing)
            .any(|edge| *edge.weight() == condition);
        if duplicate {
            return Err(GraphError::new(
                from,
                format!("Node {} already has an edge for {:?}", from, condition),
            ));
        }

        self.graph.add_edge(*from_idx, *to_idx, condition);
        Ok(())
    }

    fn validate(&self) -> Result<(), GraphError> {
        if self.entry_node_id.is_empty() {
            return Err(GraphError::new("runtime", "No entry node set"));
        }
        if !self.node_indices.contains_key(&self.entry_node_id) {
            return Err(GraphError::new(
                "runtime",
                format!("Entry node not found: {}", self.entry_node_id),
            ));
        }
        for terminal in &self.terminal_nodes {
            if !self.node_indices.contains_key(terminal) {
                return Err(GraphError::new(
                    terminal,
                    format!("Terminal node not found: {}", terminal),
                ));
            }
        }
        for (id, idx) in &self.node_indices {
            let has_outgoing = self
                .graph
                .edges_directed(*idx, Direction::Outgoing)
                .next()
                .is_some();
            if !has_outgoing && !self.terminal_nodes.contains(id) {
                return Err(GraphError::new(
                    id,
                    format!("No outgoing edges from non-terminal node: {}", id),
                ));
            }
        }
        Ok(())
    }

    /// Get node by ID
    pub fn get_node(&self, node_id: &str) -> Option<&dyn Node> {
        self.node_indices
            .get(node_id)
            .and_then(|idx| self.graph.node_weight(*idx))
            .map(|boxed| boxed.as_ref())
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> Vec<&str> {
        self.node_indices.keys().map(|s| s.as_str()).collect()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Execute the graph from the entry node until a node returns `Final`.
    ///
    /// Returns the IDs of the nodes visited, in order.
    pub async fn run(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<Vec<String>, GraphError> {
        let mut current_idx = *self.node_indices.get(&self.entry_node_id).ok_or_else(|| {
            GraphError::new(
                "runtime",
                format!("Entry node not found: {}", self.entry_node_id),
            )
        })?;

        let mut trace: Vec<String> = Vec::new();

        loop {
            if trace.len() >= self.max_steps {
                return Err(GraphError::new(
                    "runtime",
                    format!("Maximum steps ({}) exceeded", self.max_steps),
                )
                .with_trace(trace));
            }

            let node = self
                .graph
                .node_weight(current_idx)
                .ok_or_else(|| GraphError::new("runtime", "Node not found in graph"))?;

            let node_id = node.id();
            tracing::debug!("Executing node: {} (step {})", node_id, trace.len());
            trace.push(node_id.to_string());

            let output = match node.execute(state, ctx).await {
                Ok(output) => output,
                Err(err) => return Err(err.with_trace(trace)),
            };

            match output {
                NodeOutput::Final => {
                    tracing::debug!("Graph execution complete at node: {}", node_id);
                    return Ok(trace);
                }
                NodeOutput::Continue => {
                    current_idx = self
                        .resolve_next_node(current_idx, None)
                        .map_err(|e| e.with_trace(trace.clone()))?;
                }
                NodeOutput::Branch(transition) => {
                    current_idx = self
                        .resolve_next_node(current_idx, Some(transition))
                        .map_err(|e| e.with_trace(trace.clone()))?;
                }
            }
        }
    }

    /// Resolve the next node based on edges
    fn resolve_next_node(
        &self,
        current_idx: NodeIndex,
        transition: Option<Transition>,
    ) -> Result<NodeIndex, GraphError> {
        let current_id = self
            .graph
            .node_weight(current_idx)
            .map(|n| n.id())
            .unwrap_or("unknown");

        self.graph
            .edges_directed(current_idx, Direction::Outgoing)
            .find(|edge| edge.weight().matches(transition))
            .map(|edge| edge.target())
            .ok_or_else(|| {
                GraphError::new(
                    current_id,
                    format!(
                        "No matching edge for transition: {}",
                        transition.map(|t| t.as_str()).unwrap_or("(default)")
                    ),
                )
            })
    }
}

/// Builder for constructing graphs fluently
///
/// Node and edge errors are collected and reported by `build`, which also
/// checks that the entry exists and every non-terminal node can make progress.
pub struct GraphBuilder {
    nodes: Vec<Box<dyn Node>>,
    pending_edges: Vec<(String, String, EdgeCondition)>,
    terminal_nodes: HashSet<String>,
    entry_node_id: String,
    max_steps: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            pending_edges: Vec::new(),
            terminal_nodes: HashSet::new(),
            entry_node_id: String::new(),
            max_steps: 50,
        }
    }

    pub fn entry(mut self, node_id: impl Into<String>) -> Self {
        self.entry_node_id = node_id.into();
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn node(mut self, node: Box<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Mark a node that ends execution and therefore has no outgoing edges.
    pub fn terminal(mut self, node_id: impl Into<String>) -> Self {
        self.terminal_nodes.insert(node_id.into());
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::Always));
        self
    }

    pub fn conditional_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        transition: Transition,
    ) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::On(transition)));
        self
    }

    pub fn build(self) -> Result<GraphRuntime, GraphError> {
        let mut runtime = GraphRuntime::new();
        runtime.entry_node_id = self.entry_node_id;
        runtime.max_steps = self.max_steps;
        runtime.terminal_nodes = self.terminal_nodes;

        for node in self.nodes {
            runtime.add_node(node)?;
        }
        for (from, to, condition) in self.pending_edges {
            runtime.add_edge(&from, &to, condition)?;
        }
        runtime.validate()?;
        Ok(runtime)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
