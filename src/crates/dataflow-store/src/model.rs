//! Entity types persisted by the dataflow engine: flows, nodes, and data
//! records (spec §3.2–§3.4).
//!
//! All identifiers are sortable, time-ordered 128-bit values (UUIDv7). Their
//! monotonicity is used only for deterministic ordering of otherwise
//! equivalent records; equality, not ordering, is load-bearing (§3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Literal `content_type` marking a data record as a reference to another
/// record's content (§3.3).
pub const CONTENT_TYPE_REFERENCE: &str = "dataflow/reference";

/// Default discriminator used for unnamed input slots (GLOSSARY).
pub const DEFAULT_DISCRIMINATOR: &str = "default";

/// Mint a new sortable, time-ordered identifier.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// A workflow instance (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flow {
    pub flow_id: Uuid,
    pub actor_id: String,
    pub status: FlowStatus,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    pub fn new(flow_id: Uuid, actor_id: impl Into<String>, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            flow_id,
            actor_id: actor_id.into(),
            status: FlowStatus::Active,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Flow status. Advances forward only: `Active -> {Completed, Failed}` (§3.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Active,
    Completed,
    Failed,
}

/// An executable unit within a flow (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub node_id: Uuid,
    pub flow_id: Uuid,
    pub parent_node_id: Option<Uuid>,
    /// Runtime type tag, e.g. `func`, `agent`, `cycle`, `parallel`, `state`, `tool.call`.
    pub node_type: String,
    pub status: NodeStatus,
    pub config: Value,
    pub metadata: Value,
}

/// Node status lifecycle (§3.2):
/// `Template -> Pending -> Running -> {CompletedSuccess | CompletedFailure | Cancelled}`.
/// `Template` nodes are inert blueprints consumed by `cycle`/`parallel` to mint
/// concrete children; they are ignored by scheduling until materialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Template,
    Pending,
    Running,
    CompletedSuccess,
    CompletedFailure,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::CompletedSuccess | NodeStatus::CompletedFailure | NodeStatus::Cancelled
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, NodeStatus::CompletedSuccess)
    }
}

/// The only persisted payload type (§3.2–§3.3). Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRecord {
    pub data_id: Uuid,
    pub flow_id: Uuid,
    pub node_id: Option<Uuid>,
    pub record_type: DataRecordType,
    /// Semantic input slot name; defaults to `"default"`.
    pub discriminator: String,
    /// Free-form; for references, the `data_id` of the target record.
    pub key: Option<String>,
    pub content: Value,
    pub content_type: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl DataRecord {
    /// True iff this record is a reference pointing at another record's
    /// content (`content_type == "dataflow/reference"`, §3.3).
    pub fn is_reference(&self) -> bool {
        self.content_type == CONTENT_TYPE_REFERENCE
    }
}

/// Data-record types (§3.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataRecordType {
    WorkflowInput,
    WorkflowOutput,
    NodeInput,
    NodeOutput,
    NodeResult,
    NodeYield,
    NodeYieldResult,
    IterationResult,
    IterationError,
}

impl DataRecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataRecordType::WorkflowInput => "workflow_input",
            DataRecordType::WorkflowOutput => "workflow_output",
            DataRecordType::NodeInput => "node_input",
            DataRecordType::NodeOutput => "node_output",
            DataRecordType::NodeResult => "node_result",
            DataRecordType::NodeYield => "node_yield",
            DataRecordType::NodeYieldResult => "node_yield_result",
            DataRecordType::IterationResult => "iteration_result",
            DataRecordType::IterationError => "iteration_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_within_a_burst() {
        let a = new_id();
        let b = new_id();
        assert!(b >= a, "uuidv7 ids should be non-decreasing over time");
    }

    #[test]
    fn reference_detection_matches_literal_content_type() {
        let rec = DataRecord {
            data_id: new_id(),
            flow_id: new_id(),
            node_id: None,
            record_type: DataRecordType::NodeInput,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            key: Some("target".to_string()),
            content: Value::Null,
            content_type: CONTENT_TYPE_REFERENCE.to_string(),
            metadata: Value::Null,
            created_at: Utc::now(),
        };
        assert!(rec.is_reference());
    }
}
