//! Command ingestion (spec §4.3.2): execute commands through the persistence
//! interface, then fold the reported results back into [`FlowState`].

use dataflow_store::{
    new_id, Command, CommandResult, CommitOptions, CommitResult, CreateData, DataRecordType,
    InMemoryStore, Node, NodeStatus, DEFAULT_DISCRIMINATOR,
};
use uuid::Uuid;

use super::FlowState;
use crate::error::EngineError;
use crate::node_config::NodeConfig;

/// `process_commits` (§4.3.2): persist `commands`, then fold each reported
/// [`CommandResult`] into `state`.
pub async fn process_commands(
    state: &mut FlowState,
    store: &InMemoryStore,
    op_id: Uuid,
    commands: Vec<Command>,
) -> Result<CommitResult, EngineError> {
    let result = store.execute(state.flow_id, op_id, commands, CommitOptions { publish: true }).await?;
    for cr in &result.results {
        fold_result(state, cr);
    }
    Ok(result)
}

fn fold_result(state: &mut FlowState, cr: &CommandResult) {
    match &cr.input {
        Command::CreateNode(cn) => {
            let spec = serde_json::from_value::<NodeConfig>(cn.config.clone()).ok().and_then(|c| c.inputs);
            state.input_tracker.set_requirements(cn.node_id, spec);
            state.nodes.insert(
                cn.node_id,
                Node {
                    node_id: cn.node_id,
                    flow_id: cn.flow_id,
                    parent_node_id: cn.parent_node_id,
                    node_type: cn.node_type.clone(),
                    status: cn.status,
                    config: cn.config.clone(),
                    metadata: cn.metadata.clone(),
                },
            );
        }

        Command::UpdateNode(un) => {
            if let Some(node) = state.nodes.get_mut(&un.node_id) {
                if let Some(status) = un.status {
                    node.status = status;
                }
                if let Some(metadata) = &un.metadata {
                    node.metadata = metadata.clone();
                }
                if let Some(config) = &un.config {
                    node.config = config.clone();
                    let spec = serde_json::from_value::<NodeConfig>(config.clone()).ok().and_then(|c| c.inputs);
                    state.input_tracker.set_requirements(un.node_id, spec);
                }
            }
            if let Some(status) = un.status {
                on_child_status_change(state, un.node_id, status);
            }
        }

        Command::DeleteNode { node_id } => {
            state.nodes.remove(node_id);
            state.input_tracker.remove(*node_id);
        }

        Command::UpdateWorkflow(_) => {}

        Command::CreateData(cd) => match cd.record_type {
            DataRecordType::WorkflowOutput => {
                if cd.discriminator == "error" {
                    state.has_workflow_error = true;
                } else {
                    state.has_workflow_output = true;
                }
            }
            DataRecordType::NodeInput => {
                if let Some(node_id) = cd.node_id {
                    state.input_tracker.mark_available(node_id, cd.discriminator.clone());
                }
            }
            DataRecordType::NodeYield => {
                if let Some(parent) = cd.node_id {
                    if let Ok(ctx) = serde_json::from_value::<super::yield_protocol::YieldContext>(cd.content.clone()) {
                        tracing::debug!(%parent, yield_id = %ctx.yield_id, "node yielded, tracking active yield");
                        state.active_yields.insert(parent, super::yield_protocol::YieldInfo::from_context(&ctx));
                    }
                }
            }
            DataRecordType::NodeResult => {
                if let Some(child) = cd.node_id {
                    if let Some(parent) = state.active_yields.parent_of(child) {
                        if let Some(info) = state.active_yields.get_mut(parent) {
                            info.record_result(child, cd.data_id);
                        }
                    }
                }
            }
            _ => {}
        },

        Command::ApplyCommit { .. } => {}
    }
}

/// §4.3.3 "Satisfaction": emit the `node_yield_result` record the blocked
/// node runtime is waiting on, keyed by `yield_id`, and drop the yield entry
/// so the scheduler stops returning `SatisfyYield` for it.
pub async fn satisfy_yield(
    state: &mut FlowState,
    store: &InMemoryStore,
    parent: Uuid,
    yield_id: Uuid,
) -> Result<CommitResult, EngineError> {
    let content = state
        .active_yields
        .get(parent)
        .map(|info| info.result_content())
        .unwrap_or_else(|| serde_json::json!({ "yield_id": yield_id, "results": {} }));

    let result = process_commands(
        state,
        store,
        new_id(),
        vec![Command::CreateData(CreateData {
            data_id: new_id(),
            flow_id: state.flow_id,
            node_id: Some(parent),
            record_type: DataRecordType::NodeYieldResult,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            key: Some(yield_id.to_string()),
            content,
            content_type: "application/json".to_string(),
            metadata: serde_json::json!({}),
        })],
    )
    .await?;

    state.active_yields.remove(parent);
    tracing::debug!(%parent, %yield_id, "yield satisfied");
    Ok(result)
}

/// §4.3.3 process-exit step (d): when a sibling's status changes, update its
/// yield entry and run deadlock detection on the remaining `pending` siblings.
fn on_child_status_change(state: &mut FlowState, child: Uuid, status: NodeStatus) {
    let Some(parent) = state.active_yields.parent_of(child) else { return };
    let Some(info) = state.active_yields.get_mut(parent) else { return };
    info.record_status(child, status);

    if info.is_deadlocked(&state.input_tracker) {
        let stuck = info.still_pending();
        tracing::warn!(%parent, children = ?stuck, "yield deadlocked, cancelling stuck children");
        for node_id in stuck {
            if let Some(info) = state.active_yields.get_mut(parent) {
                info.record_status(node_id, NodeStatus::Cancelled);
            }
            if let Some(node) = state.nodes.get_mut(&node_id) {
                node.status = NodeStatus::Cancelled;
            }
            state.queued_commands.push(Command::UpdateNode(dataflow_store::UpdateNode {
                node_id,
                status: Some(NodeStatus::Cancelled),
                metadata: Some(serde_json::json!({"cancel_reason": "yield_deadlock", "yield_parent": parent.to_string()})),
                config: None,
            }));
        }
    }
}
