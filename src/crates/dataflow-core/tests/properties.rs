//! The remaining §8.1 testable properties not already exercised by a
//! scenario: scheduler monotonicity, crash-recovery equivalence, and
//! deadlock safety.

mod common;

use dataflow_core::{find_next_work, load_state, Decision, FlowState, Operation, SchedulerConfig};
use dataflow_store::{new_id, Node, NodeStatus};
use serde_json::json;

use common::*;

#[tokio::test]
async fn a_completed_node_is_never_dispatched_again() {
    let ops = vec![
        Operation::WithInput(json!({})),
        Operation::Func { func_id: "X".to_string(), cfg: func_cfg("x") },
        Operation::To { target: "@success".to_string(), input_key: None, transform: None },
        Operation::Func { func_id: "Y".to_string(), cfg: func_cfg("y") },
        Operation::To { target: "@success".to_string(), input_key: None, transform: None },
    ];
    let (store, mut state, output) = setup(&ops).await;
    let x_id = output.node_ids[0];
    let y_id = output.node_ids[1];

    let decision = find_next_work(&state, &SchedulerConfig::default());
    let Decision::ExecuteNodes(mut roots) = decision else { panic!("X and Y share no dependency, both should be root-ready") };
    roots.sort();
    let mut expected = vec![x_id, y_id];
    expected.sort();
    assert_eq!(roots, expected);

    mark_running(&mut state, &store, x_id).await;
    complete_node(&mut state, &store, x_id, json!({"done": "x"})).await;

    let decision = find_next_work(&state, &SchedulerConfig::default());
    let Decision::ExecuteNodes(nodes) = decision else { panic!("Y should still be dispatchable on its own") };
    assert_eq!(nodes, vec![y_id], "a completed node must never reappear in a later dispatch");

    mark_running(&mut state, &store, y_id).await;
    complete_node(&mut state, &store, y_id, json!({"done": "y"})).await;

    let decision = find_next_work(&state, &SchedulerConfig::default());
    assert_eq!(decision, Decision::CompleteWorkflow { success: true, message: "Workflow completed successfully".to_string() });
}

#[tokio::test]
async fn a_crashed_node_recovers_to_pending_and_the_workflow_still_completes() {
    let ops = vec![
        Operation::WithInput(json!({})),
        Operation::Func { func_id: "A".to_string(), cfg: func_cfg("a") },
        Operation::Func { func_id: "B".to_string(), cfg: func_cfg("b") },
    ];
    let (store, mut state, output) = setup(&ops).await;
    let a_id = output.node_ids[0];
    let b_id = output.node_ids[1];

    let decision = find_next_work(&state, &SchedulerConfig::default());
    assert_eq!(decision, Decision::ExecuteNodes(vec![a_id]));
    mark_running(&mut state, &store, a_id).await;
    complete_node(&mut state, &store, a_id, json!({"done": "a"})).await;

    let decision = find_next_work(&state, &SchedulerConfig::default());
    assert_eq!(decision, Decision::ExecuteNodes(vec![b_id]));
    mark_running(&mut state, &store, b_id).await;

    // The process crashes here: `state` is dropped, never reaching the
    // `complete_node(b_id, ..)` call a surviving orchestrator would have made.
    drop(state);

    let mut recovered = load_state(&store, output.flow_id).await.expect("load_state should succeed");
    let b_after_recovery = recovered.nodes.get(&b_id).expect("B survived the crash");
    assert_eq!(b_after_recovery.status, NodeStatus::Pending, "a node stuck running is rewritten to pending on load");
    assert_eq!(b_after_recovery.metadata["previous_status_on_restart"], "running");

    // Recovery rewrote B to pending with its input already recorded by A's
    // completion before the crash, so it dispatches immediately.
    let decision = find_next_work(&recovered, &SchedulerConfig::default());
    assert_eq!(decision, Decision::ExecuteNodes(vec![b_id]));
    mark_running(&mut recovered, &store, b_id).await;
    complete_node(&mut recovered, &store, b_id, json!({"done": "b"})).await;

    let result = workflow_output(&store, output.flow_id, "result").await;
    assert!(result.is_some(), "the post-recovery run reaches the same successful outcome as an uninterrupted one");

    let decision = find_next_work(&recovered, &SchedulerConfig::default());
    assert_eq!(decision, Decision::CompleteWorkflow { success: true, message: "Workflow completed successfully".to_string() });
}

#[test]
fn a_node_running_elsewhere_never_masks_genuinely_ready_work() {
    let flow_id = new_id();
    let mut state = FlowState::new(flow_id);

    let ready_id = new_id();
    state.nodes.insert(
        ready_id,
        Node {
            node_id: ready_id,
            flow_id,
            parent_node_id: None,
            node_type: "func".to_string(),
            status: NodeStatus::Pending,
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
        },
    );
    state.input_tracker.mark_available(ready_id, "default");

    let unrelated_running_id = new_id();
    state.nodes.insert(
        unrelated_running_id,
        Node {
            node_id: unrelated_running_id,
            flow_id,
            parent_node_id: None,
            node_type: "func".to_string(),
            status: NodeStatus::Running,
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
        },
    );

    let decision = find_next_work(&state, &SchedulerConfig::default());
    match decision {
        Decision::ExecuteNodes(nodes) => assert_eq!(nodes, vec![ready_id]),
        other => panic!("an unrelated in-flight node must never mask ready work, got {other:?}"),
    }
}
