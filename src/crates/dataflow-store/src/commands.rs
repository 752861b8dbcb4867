//! Persistence commands emitted by the compiler and routing layer, and the
//! results the commit interface reports back (spec §4.1.4, §6.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{DataRecordType, NodeStatus};

/// A command destined for the persistence engine's `execute` entry point.
///
/// Commands within one commit are applied atomically and in listed order
/// (§5 ordering guarantees).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Emit a data record.
    CreateData(CreateData),
    /// Emit a node record.
    CreateNode(CreateNode),
    /// Mutate a node's status/metadata/config.
    UpdateNode(UpdateNode),
    /// Merge metadata into the flow.
    UpdateWorkflow(UpdateWorkflow),
    /// Remove a node record (used by child-node lifecycle, e.g. cancelled templates).
    DeleteNode { node_id: Uuid },
    /// Replay a previously-issued commit id (used by the state engine to
    /// resolve `apply_commit` bookkeeping, §4.1.4).
    ApplyCommit { commit_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateData {
    pub data_id: Uuid,
    pub flow_id: Uuid,
    pub node_id: Option<Uuid>,
    pub record_type: DataRecordType,
    pub discriminator: String,
    pub key: Option<String>,
    pub content: Value,
    pub content_type: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNode {
    pub node_id: Uuid,
    pub flow_id: Uuid,
    pub parent_node_id: Option<Uuid>,
    pub node_type: String,
    pub status: NodeStatus,
    pub config: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNode {
    pub node_id: Uuid,
    pub status: Option<NodeStatus>,
    pub metadata: Option<Value>,
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkflow {
    pub flow_id: Uuid,
    pub metadata: Value,
}

/// One per-command outcome reported back by the commit interface (§6.1:
/// `result.results[i] = { input: commands[i], node_id?, data_id?, ... }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub input: Command,
    pub node_id: Option<Uuid>,
    pub data_id: Option<Uuid>,
}

/// The full result of one `execute()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub commit_id: Uuid,
    pub results: Vec<CommandResult>,
}

/// Options accepted by `CommitExecutor::execute` (§6.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// When true, downstream observers are notified of the new records.
    pub publish: bool,
}
