//! The Compiler: builder operations -> validated node graph -> persistence
//! commands (spec §4.1). Pure and synchronous, mirroring the teacher's
//! `StateGraph::compile()` / `Graph::validate()` split into distinct
//! build -> resolve -> validate -> emit stages, one module each.

mod build;
mod emit;
mod resolve;
mod validate;

use serde_json::Value;
use uuid::Uuid;

use crate::error::CompileError;
use crate::node_config::{InputTransform, InputsSpec, NodeBody};
use crate::ops::{flatten_ops, Operation, SessionContext};
use dataflow_store::Command;

/// One node as produced by the build/resolve stages, before emission.
#[derive(Debug, Clone)]
pub(crate) struct NodeDraft {
    pub node_id: Uuid,
    /// The id/name under which this node can be addressed by `to()`/`as()` —
    /// the `func_id`/`agent` string for those kinds, a fixed tag otherwise.
    pub name: String,
    pub body: NodeBody,
    pub inputs: Option<InputsSpec>,
    pub context: Option<Value>,
    pub input_transform: Option<InputTransform>,
    pub metadata: Value,
    pub parent_node_id: Option<Uuid>,
    pub is_template: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminalKind {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RouteSource {
    Input,
    Static(usize),
    Node(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouteDest {
    Named(String),
    Terminal(TerminalKind),
}

/// A route destination once `Named(..)` has been resolved against
/// `references` (§4.1.2 point 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeDest {
    Node(Uuid),
    Terminal(TerminalKind),
}

/// A fully resolved edge, ready for validation and emission.
#[derive(Debug, Clone)]
pub(crate) struct CommittedEdge {
    pub source: RouteSource,
    pub dest: EdgeDest,
    pub input_key: String,
    pub transform: Option<String>,
    pub condition: Option<String>,
    pub is_error: bool,
    pub is_auto_chain: bool,
}

/// An edge, possibly still awaiting name resolution (§4.1.1 `pending_routes`).
#[derive(Debug, Clone)]
pub(crate) struct RouteSpec {
    pub source: RouteSource,
    pub dest: RouteDest,
    pub input_key: String,
    pub transform: Option<String>,
    pub condition: Option<String>,
    /// Which list this route lives in: fires on the source's failure
    /// (`error_targets`) rather than its success (`data_targets`).
    pub is_error: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StaticSource {
    pub data: Value,
}

/// Output of a successful compile: commands ready for a `CommitExecutor`,
/// plus the minted top-level node ids in emission order.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub flow_id: Uuid,
    pub commands: Vec<Command>,
    pub node_ids: Vec<Uuid>,
    pub workflow_input_id: Option<Uuid>,
}

/// `compile(ops, session) -> (commands, graph) | error` (spec §4.1).
///
/// Pure and deterministic: no I/O, no clock reads beyond id minting (ids are
/// UUIDv7 but only their *equality*, never their ordering, is load-bearing
/// for compile correctness — see §3.1 and the compile-idempotence property
/// in §8.1).
pub fn compile(
    ops: &[Operation],
    session: Option<SessionContext>,
) -> Result<CompileOutput, CompileError> {
    let flattened = flatten_ops(ops);
    let built = build::build(&flattened)?;
    let resolved = resolve::resolve(built)?;
    validate::validate(&resolved)?;
    emit::emit(resolved, session)
}
