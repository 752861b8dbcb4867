//! Command emission phase (spec §4.1.4): lowers the resolved graph into an
//! ordered list of persistence commands.

use std::collections::HashMap;

use dataflow_store::{
    new_id, Command, CreateData, CreateNode, DataRecordType, NodeStatus, CONTENT_TYPE_REFERENCE,
    DEFAULT_DISCRIMINATOR,
};
use serde_json::Value;
use uuid::Uuid;

use super::resolve::ResolvedGraph;
use super::{CompileOutput, EdgeDest, NodeDraft, RouteSource, TerminalKind};
use crate::error::CompileError;
use crate::node_config::{DataTarget, NodeConfig};
use crate::ops::SessionContext;

const JSON_CONTENT_TYPE: &str = "application/json";

pub(crate) fn emit(
    graph: ResolvedGraph,
    session: Option<SessionContext>,
) -> Result<CompileOutput, CompileError> {
    let is_nested = session.map(|s| s.is_nested()).unwrap_or(false);
    let flow_id = session.map(|s| s.flow_id).unwrap_or_else(new_id);

    let mut commands = Vec::new();
    let mut workflow_input_id = None;

    if !is_nested {
        // 1a. Workflow input, if any.
        if let Some(input) = &graph.input_data {
            let data_id = new_id();
            workflow_input_id = Some(data_id);
            commands.push(Command::CreateData(CreateData {
                data_id,
                flow_id,
                node_id: None,
                record_type: DataRecordType::WorkflowInput,
                discriminator: DEFAULT_DISCRIMINATOR.to_string(),
                key: None,
                content: input.clone(),
                content_type: JSON_CONTENT_TYPE.to_string(),
                metadata: serde_json::json!({}),
            }));
        }

        // 1b. Static sources: full content at the first route, references at
        // the rest (§4.6 reference optimisation for static data).
        for (idx, source) in graph.static_sources.iter().enumerate() {
            let routes: Vec<&super::CommittedEdge> = graph
                .edges
                .iter()
                .filter(|e| matches!(e.source, RouteSource::Static(i) if i == idx))
                .collect();

            let mut first_id: Option<Uuid> = None;
            for route in routes {
                let EdgeDest::Node(target) = route.dest else { continue };
                let data_id = new_id();
                match first_id {
                    None => {
                        commands.push(Command::CreateData(CreateData {
                            data_id,
                            flow_id,
                            node_id: Some(target),
                            record_type: DataRecordType::NodeInput,
                            discriminator: route.input_key.clone(),
                            key: None,
                            content: source.data.clone(),
                            content_type: JSON_CONTENT_TYPE.to_string(),
                            metadata: serde_json::json!({}),
                        }));
                        first_id = Some(data_id);
                    }
                    Some(target_id) => {
                        commands.push(Command::CreateData(CreateData {
                            data_id,
                            flow_id,
                            node_id: Some(target),
                            record_type: DataRecordType::NodeInput,
                            discriminator: route.input_key.clone(),
                            key: Some(target_id.to_string()),
                            content: Value::Null,
                            content_type: CONTENT_TYPE_REFERENCE.to_string(),
                            metadata: serde_json::json!({}),
                        }));
                    }
                }
            }
        }
    } else {
        // 2. Nested: no workflow_input record. Materialize the input
        // directly at explicit input routes, or at the roots otherwise.
        // Transform application at this point would require an evaluator,
        // which the (pure, I/O-free) compiler does not carry — eager
        // transforms on nested workflow input are left to the routing
        // layer (see DESIGN.md).
        if let Some(input) = &graph.input_data {
            let explicit: Vec<&super::CommittedEdge> =
                graph.edges.iter().filter(|e| matches!(e.source, RouteSource::Input)).collect();

            if !explicit.is_empty() {
                for route in explicit {
                    let EdgeDest::Node(target) = route.dest else { continue };
                    commands.push(Command::CreateData(CreateData {
                        data_id: new_id(),
                        flow_id,
                        node_id: Some(target),
                        record_type: DataRecordType::NodeInput,
                        discriminator: route.input_key.clone(),
                        key: None,
                        content: input.clone(),
                        content_type: JSON_CONTENT_TYPE.to_string(),
                        metadata: serde_json::json!({}),
                    }));
                }
            } else {
                for root in graph.roots() {
                    commands.push(Command::CreateData(CreateData {
                        data_id: new_id(),
                        flow_id,
                        node_id: Some(root),
                        record_type: DataRecordType::NodeInput,
                        discriminator: DEFAULT_DISCRIMINATOR.to_string(),
                        key: None,
                        content: input.clone(),
                        content_type: JSON_CONTENT_TYPE.to_string(),
                        metadata: serde_json::json!({}),
                    }));
                }
            }
        }
    }

    // 1c/3/4. Node records, with per-node data_targets/error_targets lowered
    // from the resolved edges (§4.1.4 point 3-4).
    let mut edges_by_node: HashMap<Uuid, Vec<&super::CommittedEdge>> = HashMap::new();
    for e in &graph.edges {
        if let RouteSource::Node(id) = e.source {
            edges_by_node.entry(id).or_default().push(e);
        }
    }
    let leaves: std::collections::HashSet<Uuid> = graph.leaves().into_iter().collect();

    for node in &graph.nodes {
        let parent_for_terminal = effective_parent(node, session);
        let mut data_targets = Vec::new();
        let mut error_targets = Vec::new();

        for edge in edges_by_node.get(&node.node_id).into_iter().flatten() {
            let target = lower_target(node.node_id, edge, parent_for_terminal);
            if edge.is_error {
                error_targets.push(target);
            } else {
                data_targets.push(target);
            }
        }

        if leaves.contains(&node.node_id) && !node.is_template {
            data_targets.push(implicit_output_target(node.node_id, parent_for_terminal, TerminalKind::Success));
        }

        let mut config = NodeConfig::new(node.body.clone());
        config.inputs = node.inputs.clone();
        config.context = node.context.clone();
        config.input_transform = node.input_transform.clone();
        config.data_targets = data_targets;
        config.error_targets = error_targets;
        config.metadata = node.metadata.clone();

        commands.push(Command::CreateNode(CreateNode {
            node_id: node.node_id,
            flow_id,
            parent_node_id: node.parent_node_id,
            node_type: node.body.kind().as_str().to_string(),
            status: if node.is_template { NodeStatus::Template } else { NodeStatus::Pending },
            config: config.to_value(),
            metadata: node.metadata.clone(),
        }));
    }

    // 1d. Workflow-input routing: explicit routes if present, else one
    // reference per root (§4.1.4 point 1). Nested input is already
    // materialized above, not referenced a second time.
    if !is_nested {
        if let Some(input_id) = workflow_input_id {
            let explicit: Vec<&super::CommittedEdge> =
                graph.edges.iter().filter(|e| matches!(e.source, RouteSource::Input)).collect();

            if !explicit.is_empty() {
                for route in explicit {
                    let EdgeDest::Node(target) = route.dest else { continue };
                    commands.push(reference_node_input(flow_id, target, route.input_key.clone(), input_id));
                }
            } else {
                for root in graph.roots() {
                    commands.push(reference_node_input(flow_id, root, DEFAULT_DISCRIMINATOR.to_string(), input_id));
                }
            }
        }
    }

    Ok(CompileOutput { flow_id, commands, node_ids: graph.node_order, workflow_input_id })
}

fn reference_node_input(flow_id: Uuid, node_id: Uuid, discriminator: String, ref_target: Uuid) -> Command {
    Command::CreateData(CreateData {
        data_id: new_id(),
        flow_id,
        node_id: Some(node_id),
        record_type: DataRecordType::NodeInput,
        discriminator,
        key: Some(ref_target.to_string()),
        content: Value::Null,
        content_type: CONTENT_TYPE_REFERENCE.to_string(),
        metadata: serde_json::json!({}),
    })
}

/// A node's effective parent for terminal routing (§4.6 "terminal-from-child"):
/// its own `parent_node_id`, or — for a top-level node compiled inside a
/// nested session — the session's node.
fn effective_parent(node: &NodeDraft, session: Option<SessionContext>) -> Option<Uuid> {
    node.parent_node_id.or_else(|| session.and_then(|s| s.node_id))
}

fn lower_target(source_node_id: Uuid, edge: &super::CommittedEdge, parent_for_terminal: Option<Uuid>) -> DataTarget {
    match edge.dest {
        EdgeDest::Node(target) => DataTarget {
            data_type: DataRecordType::NodeInput,
            node_id: Some(target),
            discriminator: edge.input_key.clone(),
            condition: edge.condition.clone(),
            transform: edge.transform.clone(),
            source_node_id,
        },
        EdgeDest::Terminal(kind) => {
            let mut target = implicit_output_target(source_node_id, parent_for_terminal, kind);
            target.condition = edge.condition.clone();
            target.transform = edge.transform.clone();
            target
        }
    }
}

fn implicit_output_target(source_node_id: Uuid, parent_for_terminal: Option<Uuid>, kind: TerminalKind) -> DataTarget {
    let discriminator = match kind {
        TerminalKind::Success => "result",
        TerminalKind::Fail => "error",
    };
    DataTarget {
        data_type: if parent_for_terminal.is_some() { DataRecordType::NodeOutput } else { DataRecordType::WorkflowOutput },
        node_id: parent_for_terminal,
        discriminator: discriminator.to_string(),
        condition: None,
        transform: None,
        source_node_id,
    }
}
