//! The Workflow-State engine (spec §4.3): the in-memory view of one flow's
//! live execution state, kept current by folding commit results, crash
//! recovery on load, and the cooperative-yield protocol.

pub mod commit;
pub mod input_tracker;
pub mod load;
pub mod yield_protocol;

use std::collections::HashMap;

use dataflow_store::{Command, Node};
use uuid::Uuid;

pub use commit::{process_commands, satisfy_yield};
pub use input_tracker::InputTracker;
pub use load::load_state;
pub use yield_protocol::{YieldContext, YieldInfo, YieldTable};

/// One flow's live state, held by a single owner (§5: single-threaded per flow).
pub struct FlowState {
    pub flow_id: Uuid,
    pub nodes: HashMap<Uuid, Node>,
    pub input_tracker: InputTracker,
    pub active_yields: YieldTable,
    pub has_workflow_output: bool,
    pub has_workflow_error: bool,
    /// Commands generated as a side effect of folding a result (e.g. yield
    /// deadlock cancellations) that the caller must persist on its next
    /// `process_commands` round.
    pub queued_commands: Vec<Command>,
}

impl FlowState {
    pub fn new(flow_id: Uuid) -> Self {
        Self {
            flow_id,
            nodes: HashMap::new(),
            input_tracker: InputTracker::new(),
            active_yields: YieldTable::new(),
            has_workflow_output: false,
            has_workflow_error: false,
            queued_commands: Vec::new(),
        }
    }

    pub fn take_queued_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.queued_commands)
    }

    /// A top-level node is one with no `parent_node_id` — the unit the
    /// scheduler dispatches directly rather than via a yield (§4.4 point 3/4).
    pub fn is_top_level(&self, node_id: Uuid) -> bool {
        self.nodes.get(&node_id).map(|n| n.parent_node_id.is_none()).unwrap_or(false)
    }

    /// True iff `node_id` is currently listed as a pending child of some
    /// active yield (§4.4 point 2 vs. point 3 distinction).
    pub fn is_yield_child(&self, node_id: Uuid) -> bool {
        self.active_yields.parent_of(node_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_store::{new_id, CommitOptions, CreateData, CreateNode, DataRecordType, Flow, InMemoryStore, NodeStatus, DEFAULT_DISCRIMINATOR};

    #[tokio::test]
    async fn load_state_recovers_running_nodes_to_pending() {
        let store = InMemoryStore::new();
        let flow_id = new_id();
        store.create_flow(Flow::new(flow_id, "actor", serde_json::json!({}))).await;

        let node_id = new_id();
        store
            .execute(
                flow_id,
                new_id(),
                vec![Command::CreateNode(CreateNode {
                    node_id,
                    flow_id,
                    parent_node_id: None,
                    node_type: "func".to_string(),
                    status: NodeStatus::Running,
                    config: serde_json::json!({"body": {"kind": "func", "func_id": "f"}}),
                    metadata: serde_json::json!({}),
                })],
                CommitOptions::default(),
            )
            .await
            .unwrap();

        let state = load_state(&store, flow_id).await.unwrap();
        let node = state.nodes.get(&node_id).unwrap();
        assert_eq!(node.status, NodeStatus::Pending);
        assert_eq!(node.metadata["previous_status_on_restart"], "running");
    }

    #[tokio::test]
    async fn process_commands_tracks_workflow_output() {
        let store = InMemoryStore::new();
        let flow_id = new_id();
        store.create_flow(Flow::new(flow_id, "actor", serde_json::json!({}))).await;
        let mut state = FlowState::new(flow_id);

        process_commands(
            &mut state,
            &store,
            new_id(),
            vec![Command::CreateData(CreateData {
                data_id: new_id(),
                flow_id,
                node_id: None,
                record_type: DataRecordType::WorkflowOutput,
                discriminator: DEFAULT_DISCRIMINATOR.to_string(),
                key: None,
                content: serde_json::json!({"done": true}),
                content_type: "application/json".to_string(),
                metadata: serde_json::json!({}),
            })],
        )
        .await
        .unwrap();

        assert!(state.has_workflow_output);
        assert!(!state.has_workflow_error);
    }
}
