//! The compiler's input: an ordered sequence of builder operations drawn
//! from the closed set in spec §4.1. The fluent builder surface itself is
//! out of scope (§1) — callers construct this list directly, or a thin
//! wrapper elsewhere constructs it on their behalf.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node_config::{AgentConfig, CycleConfig, FuncConfig, ParallelConfig, StateConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    WithInput(Value),
    WithData(Value),
    Func { func_id: String, cfg: FuncConfig },
    Agent { agent: String, cfg: AgentConfig },
    Cycle(CycleConfig),
    Parallel(ParallelConfig),
    State(StateConfig),
    /// Inline `template.operations` into the op stream in place (§4.1.1).
    Use { operations: Vec<Operation> },
    As { name: String },
    To { target: String, input_key: Option<String>, transform: Option<String> },
    ErrorTo { target: String, input_key: Option<String>, transform: Option<String> },
    When { condition: String },
}

/// A nested-compilation context: when present, the compiler is producing
/// node/data records that live under an existing node (§4.1, `session_context`).
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub flow_id: uuid::Uuid,
    /// The node under which this (sub-)compilation is nested, if any.
    pub node_id: Option<uuid::Uuid>,
}

impl SessionContext {
    /// True when emitted terminals/workflow-input materialization should use
    /// the nested forms (`node_output`/`node_input`) rather than the
    /// top-level ones (`workflow_output`/`workflow_input`), per §4.1.4.2 and
    /// §4.6 "terminal-from-child".
    pub fn is_nested(&self) -> bool {
        self.node_id.is_some()
    }
}

/// Recursively flatten `use(template)` operations into the stream, matching
/// §4.1.1: "Inline `t.operations` into the op stream, to be processed in place."
pub fn flatten_ops(ops: &[Operation]) -> Vec<Operation> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Operation::Use { operations } => out.extend(flatten_ops(operations)),
            other => out.push(other.clone()),
        }
    }
    out
}
