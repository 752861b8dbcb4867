//! Shared scaffolding for the end-to-end scenario and property tests.
//!
//! These tests stand in for the node runtimes the compiler/engine/scheduler
//! treat as external collaborators (§1 Non-goals: "executing func/agent/tool
//! bodies"). Each helper here plays that missing role just enough to drive a
//! compiled graph to completion, the way a real executor would: persist a
//! status transition, then route the node's own output through its
//! `data_targets`/`error_targets` exactly as `[routing]` specifies.

use std::collections::BTreeMap;

use dataflow_core::{
    compile, process_commands, route_completion, BuiltinEvaluator, Command, CompileOutput, FlowState,
    NodeConfig, Operation,
};
use dataflow_store::{
    new_id, CreateData, DataRecordType, Flow, InMemoryStore, NodeStatus, OrderDir, OrderField,
    UpdateNode,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub const JSON: &str = "application/json";

/// Compile `ops`, create the flow it targets, and persist the compiled
/// commands into a fresh [`FlowState`].
pub async fn setup(ops: &[Operation]) -> (InMemoryStore, FlowState, CompileOutput) {
    let output = compile(ops, None).expect("compile should succeed");
    let store = InMemoryStore::new();
    store.create_flow(Flow::new(output.flow_id, "tester", json!({}))).await;

    let mut state = FlowState::new(output.flow_id);
    process_commands(&mut state, &store, new_id(), output.commands.clone())
        .await
        .expect("compiled commands should commit");
    (store, state, output)
}

/// Mark `node_id` `running` (no further effect on routing, just mirrors what
/// a real dispatch loop does before handing a node to its runtime).
pub async fn mark_running(state: &mut FlowState, store: &InMemoryStore, node_id: Uuid) {
    process_commands(
        state,
        store,
        new_id(),
        vec![Command::UpdateNode(UpdateNode {
            node_id,
            status: Some(NodeStatus::Running),
            metadata: None,
            config: None,
        })],
    )
    .await
    .expect("status update should commit");
}

/// Simulate a node completing successfully: persist `completed_success`,
/// then route `output` through the node's persisted `data_targets`.
pub async fn complete_node(state: &mut FlowState, store: &InMemoryStore, node_id: Uuid, output: Value) {
    let node = store.get_node(node_id).await.expect("node exists");
    let config: NodeConfig = serde_json::from_value(node.config.clone()).expect("valid node config");

    let routed = route_completion(&BuiltinEvaluator, &config.data_targets, &output, None, node_id, &Value::Null, false)
        .expect("routing should succeed");

    let mut commands = vec![Command::UpdateNode(UpdateNode {
        node_id,
        status: Some(NodeStatus::CompletedSuccess),
        metadata: None,
        config: None,
    })];
    for r in routed {
        commands.push(Command::CreateData(CreateData {
            data_id: new_id(),
            flow_id: state.flow_id,
            node_id: r.node_id,
            record_type: r.data_type,
            discriminator: r.discriminator,
            key: None,
            content: r.content,
            content_type: JSON.to_string(),
            metadata: json!({}),
        }));
    }
    process_commands(state, store, new_id(), commands).await.expect("completion should commit");
}

/// Simulate a node failing: persist `completed_failure`, then route `error`
/// through the node's persisted `error_targets`.
pub async fn fail_node(state: &mut FlowState, store: &InMemoryStore, node_id: Uuid, error: Value) {
    let node = store.get_node(node_id).await.expect("node exists");
    let config: NodeConfig = serde_json::from_value(node.config.clone()).expect("valid node config");

    let routed = route_completion(&BuiltinEvaluator, &config.error_targets, &Value::Null, Some(&error), node_id, &Value::Null, true)
        .expect("error routing should succeed");

    let mut commands = vec![Command::UpdateNode(UpdateNode {
        node_id,
        status: Some(NodeStatus::CompletedFailure),
        metadata: None,
        config: None,
    })];
    for r in routed {
        commands.push(Command::CreateData(CreateData {
            data_id: new_id(),
            flow_id: state.flow_id,
            node_id: r.node_id,
            record_type: r.data_type,
            discriminator: r.discriminator,
            key: None,
            content: r.content,
            content_type: JSON.to_string(),
            metadata: json!({}),
        }));
    }
    process_commands(state, store, new_id(), commands).await.expect("failure should commit");
}

/// Read back every `node_input` a node has received, resolving references,
/// keyed by discriminator -- the same shape a node's runtime observes at
/// entry before calling `merge_inputs`.
pub async fn raw_inputs_for(store: &InMemoryStore, flow_id: Uuid, node_id: Uuid) -> BTreeMap<String, Value> {
    let records = store
        .read(flow_id, |r| {
            r.with_nodes([node_id])
                .with_data_types([DataRecordType::NodeInput])
                .replace_references(true)
                .order_by(OrderField::CreatedAt, OrderDir::Asc)
                .all()
        })
        .await;

    records.into_iter().map(|r| (r.discriminator, r.content)).collect()
}

pub async fn workflow_output(store: &InMemoryStore, flow_id: Uuid, discriminator: &str) -> Option<Value> {
    store
        .read(flow_id, |r| {
            r.with_data_types([DataRecordType::WorkflowOutput])
                .with_data_discriminators([discriminator.to_string()])
                .one()
        })
        .await
        .map(|r| r.content)
}

pub fn func_cfg(func_id: &str) -> dataflow_core::FuncConfig {
    dataflow_core::FuncConfig { func_id: func_id.to_string(), args: None, inputs: None, context: None, input_transform: None }
}
