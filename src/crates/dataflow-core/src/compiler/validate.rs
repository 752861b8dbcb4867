//! Validation phase (spec §4.1.3): dead-node, args/default-conflict, and
//! termination checks.

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use super::resolve::ResolvedGraph;
use super::{EdgeDest, RouteSource, TerminalKind};
use crate::error::CompileError;
use crate::node_config::InputTransform;

pub(crate) fn validate(graph: &ResolvedGraph) -> Result<(), CompileError> {
    dead_node_check(graph)?;
    args_default_conflict_check(graph)?;
    termination_check(graph)?;
    Ok(())
}

/// §3.4: every non-template, non-child node must be reachable from workflow
/// input, a static source, or an outgoing edge of another node. Computed as
/// a true transitive closure from [`ResolvedGraph::roots`] (workflow-input
/// entry points) and directly input/static-fed nodes, walking forward over
/// `Node -> Node` edges, rather than a single-hop "is some edge's dest" test
/// — the latter agrees with the closure only because `resolve`'s auto-chain
/// pass and `roots()`'s own "no incoming" definition jointly guarantee every
/// top-level node already sits one hop from a root. It can't currently fire
/// through [`super::compile`]'s builder surface (see the `validate` tests
/// module), but the graph shape that check accepts isn't a contract this
/// function should rely on staying true.
fn dead_node_check(graph: &ResolvedGraph) -> Result<(), CompileError> {
    let mut reachable: HashSet<Uuid> = graph.roots().into_iter().collect();
    for e in &graph.edges {
        if let (RouteSource::Input | RouteSource::Static(_), EdgeDest::Node(to)) = (e.source, e.dest) {
            reachable.insert(to);
        }
    }

    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for e in &graph.edges {
        if let (RouteSource::Node(from), EdgeDest::Node(to)) = (e.source, e.dest) {
            adjacency.entry(from).or_default().push(to);
        }
    }

    let mut queue: VecDeque<Uuid> = reachable.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(&id) {
            for &next in neighbors {
                if reachable.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    let dead: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| !n.is_template && n.parent_node_id.is_none() && !reachable.contains(&n.node_id))
        .map(|n| n.name.clone())
        .collect();

    if dead.is_empty() {
        Ok(())
    } else {
        Err(CompileError::DeadNodes(dead))
    }
}

fn args_default_conflict_check(graph: &ResolvedGraph) -> Result<(), CompileError> {
    for node in &graph.nodes {
        let Some(_args) = node.body.args() else { continue };

        let has_default_input = graph.edges.iter().any(|e| {
            matches!(e.dest, EdgeDest::Node(id) if id == node.node_id) && e.input_key == "default"
        });
        let has_string_transform = matches!(node.input_transform, Some(InputTransform::Expr(_)));

        if has_default_input || has_string_transform {
            return Err(CompileError::ArgsDefaultConflict(node.name.clone()));
        }
    }
    Ok(())
}

fn termination_check(graph: &ResolvedGraph) -> Result<(), CompileError> {
    if graph.nodes.iter().all(|n| n.is_template) {
        return Ok(()); // no real work minted; the scheduler handles "empty workflow"
    }

    let has_explicit_success = graph.edges.iter().any(|e| {
        !e.is_error
            && matches!(e.source, RouteSource::Node(_))
            && matches!(e.dest, EdgeDest::Terminal(TerminalKind::Success))
    });
    let has_success_leaf = !graph.leaves().is_empty();

    if has_explicit_success || has_success_leaf {
        Ok(())
    } else {
        Err(CompileError::MissingSuccessPath)
    }
}
