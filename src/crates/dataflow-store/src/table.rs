//! Append-only in-memory data-record table with the secondary indexes named
//! in spec §6.4: `(flow_id)`, `(flow_id, node_id)`, `(type)`, `(discriminator)`,
//! `(key)`, `(flow_id, type, discriminator)`.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::model::{DataRecord, DataRecordType, Flow, Node};

#[derive(Debug, Default)]
pub struct DataTable {
    flows: HashMap<Uuid, Flow>,
    nodes: HashMap<Uuid, Node>,
    records: HashMap<Uuid, DataRecord>,

    by_flow: HashMap<Uuid, Vec<Uuid>>,
    by_flow_node: HashMap<(Uuid, Uuid), Vec<Uuid>>,
    by_flow_type_disc: HashMap<(Uuid, DataRecordType, String), Vec<Uuid>>,
    by_flow_key: HashMap<(Uuid, String), Vec<Uuid>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    // -- flows --

    pub fn put_flow(&mut self, flow: Flow) {
        self.flows.insert(flow.flow_id, flow);
    }

    pub fn get_flow(&self, flow_id: Uuid) -> Option<&Flow> {
        self.flows.get(&flow_id)
    }

    pub fn update_flow<F: FnOnce(&mut Flow)>(&mut self, flow_id: Uuid, f: F) -> Result<()> {
        let flow = self
            .flows
            .get_mut(&flow_id)
            .ok_or(StoreError::FlowNotFound(flow_id))?;
        f(flow);
        flow.updated_at = chrono::Utc::now();
        Ok(())
    }

    // -- nodes --

    pub fn put_node(&mut self, node: Node) {
        self.nodes.insert(node.node_id, node);
    }

    pub fn get_node(&self, node_id: Uuid) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn update_node<F: FnOnce(&mut Node)>(&mut self, node_id: Uuid, f: F) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(StoreError::NodeNotFound(node_id))?;
        f(node);
        Ok(())
    }

    pub fn delete_node(&mut self, node_id: Uuid) {
        self.nodes.remove(&node_id);
    }

    pub fn nodes_for_flow(&self, flow_id: Uuid) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.flow_id == flow_id).collect()
    }

    // -- data records --

    /// Insert a record. `data_id` must be unique within the flow (§3.4).
    pub fn insert_record(&mut self, record: DataRecord) -> Result<()> {
        if self.records.contains_key(&record.data_id) {
            return Err(StoreError::DuplicateDataId(record.data_id));
        }
        let flow_id = record.flow_id;
        let data_id = record.data_id;

        self.by_flow.entry(flow_id).or_default().push(data_id);
        if let Some(node_id) = record.node_id {
            self.by_flow_node.entry((flow_id, node_id)).or_default().push(data_id);
        }
        self.by_flow_type_disc
            .entry((flow_id, record.record_type, record.discriminator.clone()))
            .or_default()
            .push(data_id);
        if let Some(key) = &record.key {
            self.by_flow_key.entry((flow_id, key.clone())).or_default().push(data_id);
        }

        self.records.insert(data_id, record);
        Ok(())
    }

    pub fn get_record(&self, data_id: Uuid) -> Option<&DataRecord> {
        self.records.get(&data_id)
    }

    pub fn records_for_flow(&self, flow_id: Uuid) -> Vec<&DataRecord> {
        self.by_flow
            .get(&flow_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn records_for_flow_type_disc(
        &self,
        flow_id: Uuid,
        record_type: DataRecordType,
        discriminator: &str,
    ) -> Vec<&DataRecord> {
        self.by_flow_type_disc
            .get(&(flow_id, record_type, discriminator.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, DEFAULT_DISCRIMINATOR};
    use serde_json::json;

    fn rec(flow_id: Uuid, record_type: DataRecordType) -> DataRecord {
        DataRecord {
            data_id: new_id(),
            flow_id,
            node_id: None,
            record_type,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            key: None,
            content: json!({"v": 1}),
            content_type: "application/json".to_string(),
            metadata: json!({}),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn duplicate_data_id_is_rejected() {
        let mut table = DataTable::new();
        let flow_id = new_id();
        let r = rec(flow_id, DataRecordType::WorkflowInput);
        table.insert_record(r.clone()).unwrap();
        assert!(table.insert_record(r).is_err());
    }

    #[test]
    fn index_lookup_by_flow_and_type() {
        let mut table = DataTable::new();
        let flow_id = new_id();
        table.insert_record(rec(flow_id, DataRecordType::NodeInput)).unwrap();
        table.insert_record(rec(flow_id, DataRecordType::WorkflowOutput)).unwrap();
        let inputs = table.records_for_flow_type_disc(flow_id, DataRecordType::NodeInput, DEFAULT_DISCRIMINATOR);
        assert_eq!(inputs.len(), 1);
        assert_eq!(table.records_for_flow(flow_id).len(), 2);
    }
}
