//! The commit/persistence interface consumed by the workflow-state engine
//! (spec §6.1), and `InMemoryStore`, a reference implementation grounded on
//! the teacher's `InMemoryCheckpointSaver`: a lock-guarded table that never
//! fails on missing data, degrading gracefully instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::commands::{Command, CommandResult, CommitOptions, CommitResult};
use crate::error::Result;
use crate::model::{DataRecord, Flow, Node};
use crate::reader::DataReader;
use crate::table::DataTable;

/// `commit.execute(flow_id, op_id, commands[, opts]) -> result` (§6.1).
///
/// `op_id` deduplicates retries; this reference implementation treats commit
/// application as idempotent per `op_id` by skipping commits it has already
/// recorded, matching the at-least-once replay contract (§1 Non-goals, §5
/// crash recovery).
#[async_trait]
pub trait CommitExecutor: Send + Sync {
    async fn execute(
        &self,
        flow_id: Uuid,
        op_id: Uuid,
        commands: Vec<Command>,
        opts: CommitOptions,
    ) -> Result<CommitResult>;
}

/// In-memory reference store: data table + commit executor + flow/node
/// accessors, all behind a single async `RwLock` (single-writer-at-a-time,
/// matching the single-owner state engine of §5).
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<DataTable>>,
    applied_ops: Arc<RwLock<std::collections::HashSet<Uuid>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_flow(&self, flow: Flow) {
        self.inner.write().await.put_flow(flow);
    }

    pub async fn get_flow(&self, flow_id: Uuid) -> Option<Flow> {
        self.inner.read().await.get_flow(flow_id).cloned()
    }

    pub async fn nodes_for_flow(&self, flow_id: Uuid) -> Vec<Node> {
        self.inner
            .read()
            .await
            .nodes_for_flow(flow_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_node(&self, node_id: Uuid) -> Option<Node> {
        self.inner.read().await.get_node(node_id).cloned()
    }

    /// Run a read-only query against a snapshot of the table.
    pub async fn read<T>(&self, flow_id: Uuid, f: impl FnOnce(DataReader<'_>) -> T) -> T {
        let table = self.inner.read().await;
        f(DataReader::new(&table, flow_id))
    }

    pub async fn all_records(&self, flow_id: Uuid) -> Vec<DataRecord> {
        self.inner
            .read()
            .await
            .records_for_flow(flow_id)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommitExecutor for InMemoryStore {
    async fn execute(
        &self,
        flow_id: Uuid,
        op_id: Uuid,
        commands: Vec<Command>,
        _opts: CommitOptions,
    ) -> Result<CommitResult> {
        {
            let mut seen = self.applied_ops.write().await;
            if !seen.insert(op_id) {
                tracing::debug!(%op_id, "commit already applied, replaying as no-op");
                return Ok(CommitResult { commit_id: op_id, results: Vec::new() });
            }
        }

        let mut table = self.inner.write().await;
        let mut results = Vec::with_capacity(commands.len());

        for cmd in commands {
            let result = match &cmd {
                Command::CreateData(cd) => {
                    let record = DataRecord {
                        data_id: cd.data_id,
                        flow_id: cd.flow_id,
                        node_id: cd.node_id,
                        record_type: cd.record_type,
                        discriminator: cd.discriminator.clone(),
                        key: cd.key.clone(),
                        content: cd.content.clone(),
                        content_type: cd.content_type.clone(),
                        metadata: cd.metadata.clone(),
                        created_at: chrono::Utc::now(),
                    };
                    let data_id = record.data_id;
                    table.insert_record(record)?;
                    CommandResult { input: cmd, node_id: None, data_id: Some(data_id) }
                }
                Command::CreateNode(cn) => {
                    let node = Node {
                        node_id: cn.node_id,
                        flow_id: cn.flow_id,
                        parent_node_id: cn.parent_node_id,
                        node_type: cn.node_type.clone(),
                        status: cn.status,
                        config: cn.config.clone(),
                        metadata: cn.metadata.clone(),
                    };
                    let node_id = node.node_id;
                    table.put_node(node);
                    CommandResult { input: cmd, node_id: Some(node_id), data_id: None }
                }
                Command::UpdateNode(un) => {
                    let node_id = un.node_id;
                    table.update_node(node_id, |n| {
                        if let Some(status) = un.status {
                            n.status = status;
                        }
                        if let Some(metadata) = &un.metadata {
                            n.metadata = metadata.clone();
                        }
                        if let Some(config) = &un.config {
                            n.config = config.clone();
                        }
                    })?;
                    CommandResult { input: cmd, node_id: Some(node_id), data_id: None }
                }
                Command::UpdateWorkflow(uw) => {
                    let fid = uw.flow_id;
                    let meta = uw.metadata.clone();
                    table.update_flow(fid, |f| merge_json(&mut f.metadata, &meta))?;
                    CommandResult { input: cmd, node_id: None, data_id: None }
                }
                Command::DeleteNode { node_id } => {
                    let node_id = *node_id;
                    table.delete_node(node_id);
                    CommandResult { input: cmd, node_id: Some(node_id), data_id: None }
                }
                Command::ApplyCommit { .. } => CommandResult { input: cmd, node_id: None, data_id: None },
            };
            results.push(result);
        }

        let _ = flow_id;
        Ok(CommitResult { commit_id: op_id, results })
    }
}

/// Shallow merge of `patch` into `base` (object keys overwrite; non-objects replace outright).
fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(base_map), Some(patch_map)) => {
            for (k, v) in patch_map {
                base_map.insert(k.clone(), v.clone());
            }
        }
        _ => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CreateData;
    use crate::model::{new_id, DataRecordType, DEFAULT_DISCRIMINATOR};
    use serde_json::json;

    #[tokio::test]
    async fn commit_is_idempotent_per_op_id() {
        let store = InMemoryStore::new();
        let flow_id = new_id();
        store.create_flow(Flow::new(flow_id, "actor", json!({}))).await;

        let op_id = new_id();
        let data_id = new_id();
        let cmd = Command::CreateData(CreateData {
            data_id,
            flow_id,
            node_id: None,
            record_type: DataRecordType::WorkflowInput,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            key: None,
            content: json!({"x": 1}),
            content_type: "application/json".to_string(),
            metadata: json!({}),
        });

        store.execute(flow_id, op_id, vec![cmd.clone()], CommitOptions::default()).await.unwrap();
        // Replaying the same op_id must not attempt a duplicate insert and must not error.
        let replay = store.execute(flow_id, op_id, vec![cmd], CommitOptions::default()).await.unwrap();
        assert!(replay.results.is_empty());
        assert_eq!(store.all_records(flow_id).await.len(), 1);
    }
}
