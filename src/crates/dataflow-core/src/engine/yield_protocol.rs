//! Cooperative suspension: `node_yield` records, the `active_yields` map,
//! and satisfaction/deadlock handling (spec §4.3.3, §4.3.5).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::input_tracker::InputTracker;
use dataflow_store::NodeStatus;

/// The content of a `node_yield` data record (§4.3.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldContext {
    pub yield_id: Uuid,
    pub reply_to: String,
    pub run_nodes: Vec<Uuid>,
    #[serde(default)]
    pub child_path: Vec<Uuid>,
}

/// The engine's live view of one outstanding yield.
#[derive(Debug, Clone)]
pub struct YieldInfo {
    pub yield_id: Uuid,
    pub reply_to: String,
    pub pending_children: HashMap<Uuid, NodeStatus>,
    pub results: HashMap<Uuid, Uuid>,
    pub child_path: Vec<Uuid>,
}

impl YieldInfo {
    pub fn from_context(ctx: &YieldContext) -> Self {
        Self {
            yield_id: ctx.yield_id,
            reply_to: ctx.reply_to.clone(),
            pending_children: ctx.run_nodes.iter().map(|id| (*id, NodeStatus::Pending)).collect(),
            results: HashMap::new(),
            child_path: ctx.child_path.clone(),
        }
    }

    /// All listed children have reached a terminal status (§4.3.3 "process exit" step e).
    pub fn is_resolved(&self) -> bool {
        !self.pending_children.is_empty() && self.pending_children.values().all(|s| s.is_terminal())
    }

    pub fn record_status(&mut self, child: Uuid, status: NodeStatus) {
        self.pending_children.insert(child, status);
    }

    pub fn record_result(&mut self, child: Uuid, result_data_id: Uuid) {
        self.results.insert(child, result_data_id);
    }

    /// §4.3.5: no child running, and no still-`pending` child has its
    /// required inputs — the yield can never resolve on its own.
    pub fn is_deadlocked(&self, inputs: &InputTracker) -> bool {
        let mut any_running = false;
        let mut any_runnable = false;
        let mut any_pending = false;

        for (&child, &status) in &self.pending_children {
            match status {
                NodeStatus::Running => any_running = true,
                NodeStatus::Pending => {
                    any_pending = true;
                    if inputs.node_has_required_inputs(child) {
                        any_runnable = true;
                    }
                }
                _ => {}
            }
        }

        any_pending && !any_running && !any_runnable
    }

    /// Children still `pending` when a deadlock is declared — these are
    /// cancelled so the yield can proceed to satisfaction (§4.3.5).
    pub fn still_pending(&self) -> Vec<Uuid> {
        self.pending_children
            .iter()
            .filter(|(_, s)| **s == NodeStatus::Pending)
            .map(|(id, _)| *id)
            .collect()
    }

    /// `create_data{node_yield_result}` content for `satisfy_yield` (§4.3.3).
    pub fn result_content(&self) -> Value {
        let results: HashMap<String, String> =
            self.results.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        serde_json::json!({ "yield_id": self.yield_id, "results": results })
    }
}

/// `active_yields: map<parent_id, yield_info>` (§4.3).
#[derive(Debug, Default)]
pub struct YieldTable(HashMap<Uuid, YieldInfo>);

impl YieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: Uuid, info: YieldInfo) {
        self.0.insert(parent, info);
    }

    pub fn get(&self, parent: Uuid) -> Option<&YieldInfo> {
        self.0.get(&parent)
    }

    pub fn get_mut(&mut self, parent: Uuid) -> Option<&mut YieldInfo> {
        self.0.get_mut(&parent)
    }

    pub fn remove(&mut self, parent: Uuid) -> Option<YieldInfo> {
        self.0.remove(&parent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &YieldInfo)> {
        self.0.iter()
    }

    /// The parent whose child lists `child` among its `run_nodes`, if any.
    pub fn parent_of(&self, child: Uuid) -> Option<Uuid> {
        self.0.iter().find(|(_, info)| info.pending_children.contains_key(&child)).map(|(p, _)| *p)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::input_tracker::InputTracker;
    use dataflow_store::new_id;

    #[test]
    fn resolved_when_all_children_terminal() {
        let ctx = YieldContext { yield_id: new_id(), reply_to: "r".to_string(), run_nodes: vec![new_id()], child_path: vec![] };
        let mut info = YieldInfo::from_context(&ctx);
        assert!(!info.is_resolved());
        let child = ctx.run_nodes[0];
        info.record_status(child, NodeStatus::CompletedSuccess);
        assert!(info.is_resolved());
    }

    #[test]
    fn deadlock_when_no_runnable_pending_children() {
        let a = new_id();
        let b = new_id();
        let ctx = YieldContext { yield_id: new_id(), reply_to: "r".to_string(), run_nodes: vec![a, b], child_path: vec![] };
        let info = YieldInfo::from_context(&ctx);
        let inputs = InputTracker::new(); // neither child has any input available
        assert!(info.is_deadlocked(&inputs));
    }

    #[test]
    fn not_deadlocked_while_a_child_is_running() {
        let a = new_id();
        let ctx = YieldContext { yield_id: new_id(), reply_to: "r".to_string(), run_nodes: vec![a], child_path: vec![] };
        let mut info = YieldInfo::from_context(&ctx);
        info.record_status(a, NodeStatus::Running);
        let inputs = InputTracker::new();
        assert!(!info.is_deadlocked(&inputs));
    }
}
