//! Resolution & auto-chain phase (spec §4.1.2): resolve named route targets,
//! insert implicit auto-chain edges between consecutively-minted siblings
//! with no outgoing edge, then run cycle detection over the non-template
//! subgraph (invariant §3.4).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::build::BuildState;
use super::{CommittedEdge, EdgeDest, NodeDraft, RouteDest, RouteSource, StaticSource};
use crate::error::CompileError;
use dataflow_store::DEFAULT_DISCRIMINATOR;

pub(crate) struct ResolvedGraph {
    pub nodes: Vec<NodeDraft>,
    pub node_order: Vec<Uuid>,
    pub static_sources: Vec<StaticSource>,
    pub input_data: Option<serde_json::Value>,
    pub edges: Vec<CommittedEdge>,
}

impl ResolvedGraph {
    pub fn node(&self, id: Uuid) -> &NodeDraft {
        self.nodes.iter().find(|n| n.node_id == id).expect("node id present in graph")
    }

    /// Nodes with no parent and no incoming edge of any kind (auto-chain
    /// included) — the workflow's entry points (§4.1.5).
    pub fn roots(&self) -> Vec<Uuid> {
        let mut has_incoming: HashSet<Uuid> = HashSet::new();
        for e in &self.edges {
            if let EdgeDest::Node(id) = e.dest {
                has_incoming.insert(id);
            }
        }
        self.node_order
            .iter()
            .copied()
            .filter(|id| self.node(*id).parent_node_id.is_none() && !has_incoming.contains(id))
            .collect()
    }

    /// Nodes with no outgoing edge carrying a target (§4.1.5).
    pub fn leaves(&self) -> Vec<Uuid> {
        let mut has_outgoing: HashSet<Uuid> = HashSet::new();
        for e in &self.edges {
            if let RouteSource::Node(id) = e.source {
                has_outgoing.insert(id);
            }
        }
        self.node_order
            .iter()
            .copied()
            .filter(|id| !self.node(*id).is_template && !has_outgoing.contains(id))
            .collect()
    }
}

pub(crate) fn resolve(built: BuildState) -> Result<ResolvedGraph, CompileError> {
    let BuildState { nodes, node_order, references, input_data, static_sources, pending_routes } = built;

    // 1. Resolve named targets.
    let mut edges = Vec::with_capacity(pending_routes.len());
    for route in pending_routes {
        let dest = match route.dest {
            RouteDest::Terminal(kind) => EdgeDest::Terminal(kind),
            RouteDest::Named(name) => match references.get(&name) {
                Some(RouteSource::Node(id)) => EdgeDest::Node(*id),
                Some(RouteSource::Static(_)) | Some(RouteSource::Input) => {
                    return Err(CompileError::InvalidConfig(format!(
                        "'{name}' names static data or the workflow input, not a routable node"
                    )));
                }
                None => return Err(CompileError::UndefinedReference(name)),
            },
        };
        edges.push(CommittedEdge {
            source: route.source,
            dest,
            input_key: route.input_key,
            transform: route.transform,
            condition: route.condition,
            is_error: route.is_error,
            is_auto_chain: false,
        });
    }

    // 2. Auto-chain: group top-level-within-parent siblings by parent, chain
    // consecutive pairs where the earlier has no outgoing edge at all.
    let mut has_outgoing: HashSet<Uuid> = HashSet::new();
    for e in &edges {
        if let RouteSource::Node(id) = e.source {
            has_outgoing.insert(id);
        }
    }

    let mut by_parent: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
    for node in &nodes {
        by_parent.entry(node.parent_node_id).or_default().push(node.node_id);
    }
    // Preserve mint order within each group.
    for group in by_parent.values_mut() {
        group.sort_by_key(|id| node_order.iter().position(|n| n == id).unwrap_or(usize::MAX));
    }

    for group in by_parent.values() {
        for pair in group.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if !has_outgoing.contains(&prev) {
                edges.push(CommittedEdge {
                    source: RouteSource::Node(prev),
                    dest: EdgeDest::Node(next),
                    input_key: DEFAULT_DISCRIMINATOR.to_string(),
                    transform: None,
                    condition: None,
                    is_error: false,
                    is_auto_chain: true,
                });
                has_outgoing.insert(prev);
            }
        }
    }

    let graph = ResolvedGraph { nodes, node_order, static_sources, input_data, edges };

    // 3. Cycle detection over the non-template subgraph.
    detect_cycles(&graph)?;

    Ok(graph)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

fn detect_cycles(graph: &ResolvedGraph) -> Result<(), CompileError> {
    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for e in &graph.edges {
        if let (RouteSource::Node(from), EdgeDest::Node(to)) = (e.source, e.dest) {
            if !graph.node(from).is_template && !graph.node(to).is_template {
                adjacency.entry(from).or_default().push(to);
            }
        }
    }

    let mut colors: HashMap<Uuid, Color> = HashMap::new();
    for node in &graph.nodes {
        if node.is_template {
            continue;
        }
        colors.entry(node.node_id).or_insert(Color::White);
    }

    let mut stack: Vec<Uuid> = Vec::new();
    for node in &graph.nodes {
        if node.is_template {
            continue;
        }
        if colors[&node.node_id] == Color::White {
            visit(node.node_id, &adjacency, &mut colors, &mut stack, graph)?;
        }
    }
    Ok(())
}

fn visit(
    id: Uuid,
    adjacency: &HashMap<Uuid, Vec<Uuid>>,
    colors: &mut HashMap<Uuid, Color>,
    stack: &mut Vec<Uuid>,
    graph: &ResolvedGraph,
) -> Result<(), CompileError> {
    colors.insert(id, Color::Gray);
    stack.push(id);

    if let Some(neighbors) = adjacency.get(&id) {
        for &next in neighbors {
            match colors.get(&next).copied().unwrap_or(Color::White) {
                Color::White => visit(next, adjacency, colors, stack, graph)?,
                Color::Gray => {
                    let mut path: Vec<String> = stack.iter().map(|id| graph.node(*id).name.clone()).collect();
                    path.push(graph.node(next).name.clone());
                    return Err(CompileError::CycleDetected(path.join(" -> ")));
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    colors.insert(id, Color::Black);
    Ok(())
}
