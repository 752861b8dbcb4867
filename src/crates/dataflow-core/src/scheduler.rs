//! The Scheduler (spec §4.4): a pure decision function over a [`FlowState`]
//! snapshot. No I/O, no mutation — callers act on the returned [`Decision`]
//! and feed the consequences back through [`crate::engine::process_commands`].

use std::collections::HashMap;

use dataflow_store::NodeStatus;
use uuid::Uuid;

use crate::engine::FlowState;

/// `MAX_CONCURRENT_NODES` / `ENABLE_INPUT_CONCURRENCY` / `ENABLE_YIELD_CONCURRENCY`
/// (§5), wired as config rather than globals.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_concurrent_nodes: usize,
    pub enable_input_concurrency: bool,
    pub enable_yield_concurrency: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrent_nodes: 10, enable_input_concurrency: true, enable_yield_concurrency: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    ExecuteNodes(Vec<Uuid>),
    SatisfyYield { parent: Uuid, yield_id: Uuid, reply_to: String, results: HashMap<Uuid, Uuid> },
    CompleteWorkflow { success: bool, message: String },
    NoWork(String),
}

/// `find_next_work(snapshot) -> Decision` (§4.4). Priority order, first match wins.
pub fn find_next_work(state: &FlowState, config: &SchedulerConfig) -> Decision {
    // 1. Yield-driven completion.
    for (&parent, info) in state.active_yields.iter() {
        if info.is_resolved() {
            tracing::debug!(%parent, yield_id = %info.yield_id, "yield resolved, ready to satisfy");
            return Decision::SatisfyYield {
                parent,
                yield_id: info.yield_id,
                reply_to: info.reply_to.clone(),
                results: info.results.clone(),
            };
        }
    }

    // 2. Yield-driven work.
    for (&parent, info) in state.active_yields.iter() {
        if info.pending_children.values().all(|s| *s != NodeStatus::Pending) {
            continue; // no pending children left in this yield; handled by (1) once resolved
        }

        let runnable = info
            .pending_children
            .iter()
            .find(|(&child, &status)| status == NodeStatus::Pending && state.input_tracker.node_has_required_inputs(child))
            .map(|(&child, _)| child);

        if let Some(child) = runnable {
            let _ = config.enable_yield_concurrency; // yield children always run one at a time (§5)
            return Decision::ExecuteNodes(vec![child]);
        }

        let any_running = info.pending_children.values().any(|s| *s == NodeStatus::Running);
        if !any_running {
            return Decision::CompleteWorkflow { success: false, message: format!("Yield deadlock at parent {parent}") };
        }
    }

    // 3. Input-ready work: declared requirements, all satisfied.
    let input_ready: Vec<Uuid> = top_level_pending(state)
        .filter(|&id| state.input_tracker.has_requirements(id) && state.input_tracker.node_has_required_inputs(id))
        .collect();
    if !input_ready.is_empty() {
        return Decision::ExecuteNodes(cap(input_ready, config));
    }

    // 4. Root-driven work: no declared requirements, some input has arrived.
    let root_ready: Vec<Uuid> = top_level_pending(state)
        .filter(|&id| !state.input_tracker.has_requirements(id) && state.input_tracker.has_any_input(id))
        .collect();
    if !root_ready.is_empty() {
        return Decision::ExecuteNodes(cap(root_ready, config));
    }

    // 5. Completion check.
    if state.nodes.is_empty() {
        return Decision::CompleteWorkflow { success: true, message: "Empty workflow".to_string() };
    }
    if state.has_workflow_error {
        return Decision::CompleteWorkflow { success: false, message: "Workflow terminated with error".to_string() };
    }
    if state.has_workflow_output {
        return Decision::CompleteWorkflow { success: true, message: "Workflow completed successfully".to_string() };
    }

    // A node still running may yet produce the input another pending node
    // is waiting on — only declare failure once nothing is in flight.
    let any_running = state.nodes.values().any(|n| n.status == NodeStatus::Running);

    let pending: Vec<Uuid> = state.nodes.values().filter(|n| n.status == NodeStatus::Pending).map(|n| n.node_id).collect();
    if pending.is_empty() {
        if any_running {
            return Decision::NoWork("waiting for external events".to_string());
        }
        return Decision::CompleteWorkflow { success: false, message: "completed without producing output".to_string() };
    }

    let any_could_run = pending.iter().any(|&id| state.input_tracker.node_has_required_inputs(id));
    if !any_could_run {
        if any_running {
            return Decision::NoWork("waiting for external events".to_string());
        }
        let no_input_at_all = pending.iter().all(|&id| !state.input_tracker.has_any_input(id));
        let message = if no_input_at_all { "No input data provided" } else { "deadlocked" };
        return Decision::CompleteWorkflow { success: false, message: message.to_string() };
    }

    // 6. Otherwise: wait for an external event (a commit, a process exit).
    Decision::NoWork("waiting for external events".to_string())
}

fn top_level_pending(state: &FlowState) -> impl Iterator<Item = Uuid> + '_ {
    state
        .nodes
        .values()
        .filter(|n| n.status == NodeStatus::Pending && n.parent_node_id.is_none())
        .map(|n| n.node_id)
        .filter(|&id| !state.is_yield_child(id))
}

fn cap(mut candidates: Vec<Uuid>, config: &SchedulerConfig) -> Vec<Uuid> {
    candidates.sort(); // deterministic across calls; §4.4 "determinism note" only forbids relying on a *specific* order
    if config.enable_input_concurrency {
        candidates.truncate(config.max_concurrent_nodes);
        candidates
    } else {
        candidates.truncate(1);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_store::{new_id, Node};

    fn pending_node(flow_id: Uuid) -> Node {
        Node {
            node_id: new_id(),
            flow_id,
            parent_node_id: None,
            node_type: "func".to_string(),
            status: NodeStatus::Pending,
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn empty_workflow_completes_successfully() {
        let state = FlowState::new(new_id());
        let decision = find_next_work(&state, &SchedulerConfig::default());
        assert_eq!(decision, Decision::CompleteWorkflow { success: true, message: "Empty workflow".to_string() });
    }

    #[test]
    fn root_ready_node_is_dispatched() {
        let flow_id = new_id();
        let mut state = FlowState::new(flow_id);
        let node = pending_node(flow_id);
        let node_id = node.node_id;
        state.nodes.insert(node_id, node);
        state.input_tracker.mark_available(node_id, "default");

        let decision = find_next_work(&state, &SchedulerConfig::default());
        assert_eq!(decision, Decision::ExecuteNodes(vec![node_id]));
    }

    #[test]
    fn pending_node_with_no_input_is_deadlocked_at_completion_check() {
        let flow_id = new_id();
        let mut state = FlowState::new(flow_id);
        let node = pending_node(flow_id);
        state.nodes.insert(node.node_id, node);

        let decision = find_next_work(&state, &SchedulerConfig::default());
        assert_eq!(
            decision,
            Decision::CompleteWorkflow { success: false, message: "No input data provided".to_string() }
        );
    }

    #[test]
    fn no_work_when_a_node_is_already_running() {
        let flow_id = new_id();
        let mut state = FlowState::new(flow_id);
        let mut node = pending_node(flow_id);
        node.status = NodeStatus::Running;
        state.nodes.insert(node.node_id, node);

        let decision = find_next_work(&state, &SchedulerConfig::default());
        assert_eq!(decision, Decision::NoWork("waiting for external events".to_string()));
    }
}
