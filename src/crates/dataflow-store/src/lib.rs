//! # dataflow-store — data record store, reader, and commit interface
//!
//! This crate holds the lowest layer of the dataflow engine: the entities
//! that get persisted (flows, nodes, data records), the append-only table
//! and its secondary indexes, the query-builder reader with reference
//! resolution, and the `CommitExecutor` trait the workflow-state engine
//! drives commands through.
//!
//! It has no dependency on `dataflow-core` — the compiler, scheduler, and
//! routing layer build on top of the types defined here, not the other way
//! around.
//!
//! See also:
//! - [`model`] — `Flow`, `Node`, `DataRecord` and their enums
//! - [`commands`] — the `Command` list the compiler and routing layer emit
//! - [`table`] — the indexed in-memory table
//! - [`reader`] — the `DataReader` query builder and reference resolution
//! - [`commit`] — `CommitExecutor` and `InMemoryStore`

pub mod commands;
pub mod commit;
pub mod error;
pub mod model;
pub mod reader;
pub mod table;

pub use commands::{Command, CommandResult, CommitOptions, CommitResult, CreateData, CreateNode, UpdateNode, UpdateWorkflow};
pub use commit::{CommitExecutor, InMemoryStore};
pub use error::{Result, StoreError};
pub use model::{new_id, DataRecord, DataRecordType, Flow, FlowStatus, Node, NodeStatus, CONTENT_TYPE_REFERENCE, DEFAULT_DISCRIMINATOR};
pub use reader::{DataReader, OrderDir, OrderField, ResolvedRecord};
pub use table::DataTable;
