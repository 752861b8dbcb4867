//! Query builder over the data-record table, with reference resolution and
//! replacement (spec §4.2).

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{DataRecord, DataRecordType};
use crate::table::DataTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreatedAt,
    DataId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

/// A record as returned by the reader: the stored row plus (optionally) the
/// resolved reference target's fields, or — with `replace_references` — the
/// row rewritten in place to look like the target record.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub data_id: Uuid,
    pub flow_id: Uuid,
    pub node_id: Option<Uuid>,
    pub record_type: DataRecordType,
    pub discriminator: String,
    pub key: Option<String>,
    pub content: Value,
    pub content_type: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,

    pub ref_content: Option<Value>,
    pub ref_content_type: Option<String>,
    pub ref_type: Option<DataRecordType>,
    pub ref_discriminator: Option<String>,
    pub ref_key: Option<String>,
    pub ref_metadata: Option<Value>,
}

impl ResolvedRecord {
    fn from_record(r: &DataRecord, want_content: bool, want_metadata: bool) -> Self {
        Self {
            data_id: r.data_id,
            flow_id: r.flow_id,
            node_id: r.node_id,
            record_type: r.record_type,
            discriminator: r.discriminator.clone(),
            key: r.key.clone(),
            content: if want_content { r.content.clone() } else { Value::Null },
            content_type: r.content_type.clone(),
            metadata: if want_metadata { r.metadata.clone() } else { Value::Null },
            created_at: r.created_at,
            ref_content: None,
            ref_content_type: None,
            ref_type: None,
            ref_discriminator: None,
            ref_key: None,
            ref_metadata: None,
        }
    }
}

pub struct DataReader<'a> {
    table: &'a DataTable,
    flow_id: Uuid,
    node_ids: Option<Vec<Uuid>>,
    data_ids: Option<Vec<Uuid>>,
    types: Option<Vec<DataRecordType>>,
    keys: Option<Vec<String>>,
    discriminators: Option<Vec<String>>,
    want_content: bool,
    want_metadata: bool,
    resolve_refs: bool,
    replace_refs: bool,
    order: Option<(OrderField, OrderDir)>,
}

impl<'a> DataReader<'a> {
    pub fn new(table: &'a DataTable, flow_id: Uuid) -> Self {
        Self {
            table,
            flow_id,
            node_ids: None,
            data_ids: None,
            types: None,
            keys: None,
            discriminators: None,
            want_content: true,
            want_metadata: true,
            resolve_refs: true,
            replace_refs: false,
            order: None,
        }
    }

    pub fn with_nodes(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.node_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_data(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.data_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_data_types(mut self, types: impl IntoIterator<Item = DataRecordType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    pub fn with_data_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.keys = Some(keys.into_iter().collect());
        self
    }

    pub fn with_data_discriminators(mut self, discs: impl IntoIterator<Item = String>) -> Self {
        self.discriminators = Some(discs.into_iter().collect());
        self
    }

    pub fn content(mut self, on: bool) -> Self {
        self.want_content = on;
        self
    }

    pub fn metadata(mut self, on: bool) -> Self {
        self.want_metadata = on;
        self
    }

    pub fn resolve_references(mut self, on: bool) -> Self {
        self.resolve_refs = on;
        self
    }

    pub fn replace_references(mut self, on: bool) -> Self {
        self.replace_refs = on;
        self
    }

    pub fn order_by(mut self, field: OrderField, dir: OrderDir) -> Self {
        self.order = Some((field, dir));
        self
    }

    fn matches(&self, r: &DataRecord) -> bool {
        if r.flow_id != self.flow_id {
            return false;
        }
        if let Some(ids) = &self.node_ids {
            if !r.node_id.map(|n| ids.contains(&n)).unwrap_or(false) {
                return false;
            }
        }
        if let Some(ids) = &self.data_ids {
            if !ids.contains(&r.data_id) {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !types.contains(&r.record_type) {
                return false;
            }
        }
        if let Some(keys) = &self.keys {
            if !r.key.as_ref().map(|k| keys.contains(k)).unwrap_or(false) {
                return false;
            }
        }
        if let Some(discs) = &self.discriminators {
            if !discs.contains(&r.discriminator) {
                return false;
            }
        }
        true
    }

    fn fetch(&self) -> Vec<&'a DataRecord> {
        let mut rows: Vec<&DataRecord> = self
            .table
            .records_for_flow(self.flow_id)
            .into_iter()
            .filter(|r| self.matches(r))
            .collect();

        if let Some((field, dir)) = self.order {
            rows.sort_by(|a, b| {
                let ord = match field {
                    OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
                    OrderField::DataId => a.data_id.cmp(&b.data_id),
                };
                if dir == OrderDir::Desc {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        rows
    }

    /// Resolve a reference record's target and fold the result into a
    /// [`ResolvedRecord`], following the semantics of spec §4.2.
    fn resolve_one(&self, r: &DataRecord) -> ResolvedRecord {
        let mut out = ResolvedRecord::from_record(r, self.want_content, self.want_metadata);

        if !r.is_reference() || (!self.resolve_refs && !self.replace_refs) {
            return out;
        }

        let Some(key) = &r.key else { return out };
        let Ok(target_id) = key.parse::<Uuid>() else {
            return out; // dangling / malformed reference: tolerate, never fail
        };
        let Some(target) = self.table.get_record(target_id) else {
            return out; // dangling reference
        };

        if self.replace_refs {
            out.data_id = target.data_id;
            out.content = if self.want_content { target.content.clone() } else { Value::Null };
            out.content_type = target.content_type.clone();
            out.key = target.key.clone();
            out.ref_content = None;
            out.ref_content_type = None;
            out.ref_type = None;
            out.ref_discriminator = None;
            out.ref_key = None;
            out.ref_metadata = None;
        } else {
            out.ref_content = Some(if self.want_content { target.content.clone() } else { Value::Null });
            out.ref_content_type = Some(target.content_type.clone());
            out.ref_type = Some(target.record_type);
            out.ref_discriminator = Some(target.discriminator.clone());
            out.ref_key = target.key.clone();
            out.ref_metadata = Some(if self.want_metadata { target.metadata.clone() } else { Value::Null });
        }
        out
    }

    pub fn all(&self) -> Vec<ResolvedRecord> {
        self.fetch().into_iter().map(|r| self.resolve_one(r)).collect()
    }

    pub fn one(&self) -> Option<ResolvedRecord> {
        self.fetch().first().map(|r| self.resolve_one(r))
    }

    pub fn count(&self) -> usize {
        self.fetch().len()
    }

    pub fn exists(&self) -> bool {
        !self.fetch().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, DEFAULT_DISCRIMINATOR, CONTENT_TYPE_REFERENCE};
    use serde_json::json;

    fn base_rec(flow_id: Uuid) -> DataRecord {
        DataRecord {
            data_id: new_id(),
            flow_id,
            node_id: None,
            record_type: DataRecordType::NodeInput,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            key: None,
            content: json!({"k": 1}),
            content_type: "application/json".to_string(),
            metadata: json!({}),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn reference_transparency_replace_references() {
        let mut table = DataTable::new();
        let flow_id = new_id();
        let target = base_rec(flow_id);
        let target_id = target.data_id;
        table.insert_record(target.clone()).unwrap();

        let mut reference = base_rec(flow_id);
        reference.content = Value::Null;
        reference.content_type = CONTENT_TYPE_REFERENCE.to_string();
        reference.key = Some(target_id.to_string());
        table.insert_record(reference.clone()).unwrap();

        let direct = DataReader::new(&table, flow_id)
            .with_data([target_id])
            .one()
            .unwrap();
        let via_ref = DataReader::new(&table, flow_id)
            .with_data([reference.data_id])
            .replace_references(true)
            .one()
            .unwrap();

        assert_eq!(direct.content, via_ref.content);
        assert_eq!(via_ref.data_id, target_id);
    }

    #[test]
    fn dangling_reference_does_not_crash() {
        let mut table = DataTable::new();
        let flow_id = new_id();
        let mut reference = base_rec(flow_id);
        reference.content_type = CONTENT_TYPE_REFERENCE.to_string();
        reference.key = Some(new_id().to_string());
        table.insert_record(reference.clone()).unwrap();

        let row = DataReader::new(&table, flow_id)
            .with_data([reference.data_id])
            .one()
            .unwrap();
        assert!(row.ref_content.is_none());
        assert_eq!(row.data_id, reference.data_id);
    }

    #[test]
    fn resolve_references_fills_ref_fields_without_rewriting() {
        let mut table = DataTable::new();
        let flow_id = new_id();
        let target = base_rec(flow_id);
        let target_id = target.data_id;
        table.insert_record(target).unwrap();

        let mut reference = base_rec(flow_id);
        reference.content_type = CONTENT_TYPE_REFERENCE.to_string();
        reference.key = Some(target_id.to_string());
        let ref_id = reference.data_id;
        table.insert_record(reference).unwrap();

        let row = DataReader::new(&table, flow_id).with_data([ref_id]).one().unwrap();
        assert_eq!(row.data_id, ref_id);
        assert_eq!(row.ref_content, Some(json!({"k": 1})));
    }
}
