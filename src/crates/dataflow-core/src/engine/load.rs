//! `load_state` (spec §4.3.1): read a flow's persisted nodes/data into a
//! fresh [`FlowState`], recover crashed nodes, and reconstruct yields.

use std::collections::HashMap;

use dataflow_store::{
    new_id, Command, CommitOptions, DataRecordType, InMemoryStore, Node, NodeStatus, OrderDir,
    OrderField, UpdateNode,
};
use serde_json::Value;
use uuid::Uuid;

use super::yield_protocol::{YieldContext, YieldInfo};
use super::FlowState;
use crate::error::EngineError;
use crate::node_config::NodeConfig;

pub async fn load_state(store: &InMemoryStore, flow_id: Uuid) -> Result<FlowState, EngineError> {
    let nodes = store.nodes_for_flow(flow_id).await;
    let mut node_map: HashMap<Uuid, Node> = nodes.into_iter().map(|n| (n.node_id, n)).collect();

    let mut state = FlowState::new(flow_id);

    // Crash recovery: any node still marked `running` did not survive the
    // previous process. Rewrite to `pending` and record why.
    let mut recovery_commands = Vec::new();
    for node in node_map.values_mut() {
        if node.status == NodeStatus::Running {
            tracing::warn!(node_id = %node.node_id, %flow_id, "recovering node stuck in running status");
            let mut metadata = node.metadata.clone();
            merge_object(
                &mut metadata,
                serde_json::json!({
                    "orchestrator_restarted_at": chrono::Utc::now().to_rfc3339(),
                    "previous_status_on_restart": "running",
                }),
            );
            node.status = NodeStatus::Pending;
            node.metadata = metadata.clone();
            recovery_commands.push(Command::UpdateNode(UpdateNode {
                node_id: node.node_id,
                status: Some(NodeStatus::Pending),
                metadata: Some(metadata),
                config: None,
            }));
        }
    }
    if !recovery_commands.is_empty() {
        store
            .execute(flow_id, new_id(), recovery_commands, CommitOptions { publish: false })
            .await?;
    }

    // Input requirements, from each node's persisted config.
    for node in node_map.values() {
        let spec = serde_json::from_value::<NodeConfig>(node.config.clone()).ok().and_then(|c| c.inputs);
        state.input_tracker.set_requirements(node.node_id, spec);
    }

    // Available inputs, workflow completion flags.
    let records = store
        .read(flow_id, |r| {
            r.with_data_types([DataRecordType::NodeInput, DataRecordType::WorkflowOutput, DataRecordType::NodeYield])
                .order_by(OrderField::CreatedAt, OrderDir::Asc)
                .all()
        })
        .await;

    let mut yield_records = Vec::new();
    for rec in &records {
        match rec.record_type {
            DataRecordType::NodeInput => {
                if let Some(node_id) = rec.node_id {
                    state.input_tracker.mark_available(node_id, rec.discriminator.clone());
                }
            }
            DataRecordType::WorkflowOutput => {
                if rec.discriminator == "error" {
                    state.has_workflow_error = true;
                } else {
                    state.has_workflow_output = true;
                }
            }
            DataRecordType::NodeYield => yield_records.push(rec.clone()),
            _ => {}
        }
    }

    // Yield reconstruction (§4.3.1): only for yields belonging to a node
    // that is still pending (i.e. the yield was never satisfied).
    for rec in yield_records {
        let Some(parent) = rec.node_id else { continue };
        let Some(parent_node) = node_map.get(&parent) else { continue };
        if parent_node.status != NodeStatus::Pending {
            continue;
        }
        let Ok(ctx) = serde_json::from_value::<YieldContext>(rec.content.clone()) else { continue };

        let mut info = YieldInfo::from_context(&ctx);
        for &child in &ctx.run_nodes {
            let Some(child_node) = node_map.get(&child) else { continue };
            info.record_status(child, child_node.status);
            if child_node.status.is_terminal() {
                if let Some(result_id) = find_node_result_id(store, flow_id, child).await {
                    info.record_result(child, result_id);
                }
            }
        }
        tracing::debug!(%parent, yield_id = %ctx.yield_id, "reconstructed active yield from persisted record");
        state.active_yields.insert(parent, info);
    }

    state.nodes = node_map;
    Ok(state)
}

async fn find_node_result_id(store: &InMemoryStore, flow_id: Uuid, node_id: Uuid) -> Option<Uuid> {
    store
        .read(flow_id, |r| {
            r.with_nodes([node_id])
                .with_data_types([DataRecordType::NodeResult])
                .content(false)
                .order_by(OrderField::CreatedAt, OrderDir::Desc)
                .one()
        })
        .await
        .map(|rec| rec.data_id)
}

fn merge_object(base: &mut Value, patch: Value) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(base_map), Some(patch_map)) => {
            for (k, v) in patch_map {
                base_map.insert(k.clone(), v.clone());
            }
        }
        _ => *base = patch,
    }
}
