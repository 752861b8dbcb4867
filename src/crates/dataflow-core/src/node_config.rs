//! The node configuration schema: a closed sum type over runtime kinds, with
//! common routing/input fields and an opaque pass-through bag for anything a
//! runtime needs that the compiler doesn't understand (spec §6.3, §9 design
//! notes: "dynamic dispatch on node type").
//!
//! The state engine persists `type` as a string (`NodeKind::as_str`) but the
//! compiler and routing layer dispatch on the structured [`NodeBody`] enum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ops::Operation;

/// Runtime type tag (§3.2, §9). Kept as a closed sum type in Rust; persisted
/// as its string form on [`dataflow_store::Node::node_type`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Func,
    Agent,
    Cycle,
    Parallel,
    State,
    ToolCall,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Func => "func",
            NodeKind::Agent => "agent",
            NodeKind::Cycle => "cycle",
            NodeKind::Parallel => "parallel",
            NodeKind::State => "state",
            NodeKind::ToolCall => "tool.call",
        }
    }
}

/// Required/optional input-slot declarations consumed by the input tracker
/// (§4.3, §4.3.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputsSpec {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

/// `config.input_transform` (§4.5): either a single string expression
/// (evaluated once, stored under `"default"`) or a table mapping output
/// field names to expressions (each evaluated independently).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputTransform {
    Expr(String),
    Table(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncConfig {
    pub func_id: String,
    pub args: Option<Value>,
    pub inputs: Option<InputsSpec>,
    pub context: Option<Value>,
    pub input_transform: Option<InputTransform>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCalling {
    None,
    Auto,
    Any,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub prompt: Option<String>,
    pub max_iterations: Option<u32>,
    pub min_iterations: Option<u32>,
    pub tool_calling: Option<ToolCalling>,
    pub exit_schema: Option<Value>,
    pub exit_func_id: Option<String>,
    pub tools: Option<Vec<String>>,
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: String,
    pub model: Option<String>,
    pub arena: Option<ArenaConfig>,
    pub show_tool_calls: Option<bool>,
    pub inputs: Option<InputsSpec>,
    pub input_transform: Option<InputTransform>,
}

/// A `cycle` or `parallel` node's nested template is a reusable operation
/// fragment (the same `Operation` stream the top-level compiler consumes,
/// §4.1.1 `use(t)`). The compiler recursively mints one `status = template`
/// child node per minting operation in the fragment, chaining each to the
/// next via a `node_input/default` data target.
pub type TemplateOps = Vec<Operation>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    pub func_id: Option<String>,
    pub template: Option<TemplateOps>,
    pub continue_condition: Option<String>,
    pub continue_func_id: Option<String>,
    pub max_iterations: Option<u32>,
    pub initial_state: Option<Value>,
    pub inputs: Option<InputsSpec>,
    pub context: Option<Value>,
    pub input_transform: Option<InputTransform>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Continue,
    FailFast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    All,
    Successes,
    Failures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub source_array_key: String,
    #[serde(default = "default_iteration_input_key")]
    pub iteration_input_key: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    pub on_error: OnError,
    pub filter: FilterMode,
    pub unwrap: Option<bool>,
    pub passthrough_keys: Option<Vec<String>>,
    pub template: Option<TemplateOps>,
    pub inputs: Option<InputsSpec>,
    pub input_transform: Option<InputTransform>,
}

fn default_iteration_input_key() -> String {
    "default".to_string()
}

fn default_batch_size() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_output_mode")]
    pub output_mode: OutputMode,
    pub ignored_keys: Option<Vec<String>>,
    pub inputs: Option<InputsSpec>,
    pub input_transform: Option<InputTransform>,
}

fn default_output_mode() -> OutputMode {
    OutputMode::Object
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBody {
    Func(FuncConfig),
    Agent(AgentConfig),
    Cycle(CycleConfig),
    Parallel(ParallelConfig),
    State(StateConfig),
    ToolCall,
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Func(_) => NodeKind::Func,
            NodeBody::Agent(_) => NodeKind::Agent,
            NodeBody::Cycle(_) => NodeKind::Cycle,
            NodeBody::Parallel(_) => NodeKind::Parallel,
            NodeBody::State(_) => NodeKind::State,
            NodeBody::ToolCall => NodeKind::ToolCall,
        }
    }

    /// `args`/`default`-conflict check target: does this body expose a base
    /// `args` object that inputs merge into (§4.1.3)?
    pub fn args(&self) -> Option<&Value> {
        match self {
            NodeBody::Func(f) => f.args.as_ref(),
            _ => None,
        }
    }

    /// The `inputs` field named for every kind in the §6.3 schema table,
    /// copied onto the node draft at mint time.
    pub fn inputs_spec(&self) -> Option<InputsSpec> {
        match self {
            NodeBody::Func(f) => f.inputs.clone(),
            NodeBody::Agent(a) => a.inputs.clone(),
            NodeBody::Cycle(c) => c.inputs.clone(),
            NodeBody::Parallel(p) => p.inputs.clone(),
            NodeBody::State(s) => s.inputs.clone(),
            NodeBody::ToolCall => None,
        }
    }

    pub fn context_value(&self) -> Option<Value> {
        match self {
            NodeBody::Func(f) => f.context.clone(),
            NodeBody::Cycle(c) => c.context.clone(),
            _ => None,
        }
    }

    pub fn input_transform_spec(&self) -> Option<InputTransform> {
        match self {
            NodeBody::Func(f) => f.input_transform.clone(),
            NodeBody::Agent(a) => a.input_transform.clone(),
            NodeBody::Cycle(c) => c.input_transform.clone(),
            NodeBody::Parallel(p) => p.input_transform.clone(),
            NodeBody::State(s) => s.input_transform.clone(),
            NodeBody::ToolCall => None,
        }
    }
}

/// A compile-time edge, lowered into `config.data_targets` /
/// `config.error_targets` (§4.1.4 point 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTarget {
    pub data_type: crate::DataRecordType,
    pub node_id: Option<uuid::Uuid>,
    pub discriminator: String,
    pub condition: Option<String>,
    pub transform: Option<String>,
    pub source_node_id: uuid::Uuid,
}

/// The full persisted `config` value for a node (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub body: NodeBody,
    pub inputs: Option<InputsSpec>,
    pub context: Option<Value>,
    pub input_transform: Option<InputTransform>,
    #[serde(default)]
    pub data_targets: Vec<DataTarget>,
    #[serde(default)]
    pub error_targets: Vec<DataTarget>,
    pub metadata: Value,
    /// Opaque fields that must survive a round trip untouched (§9).
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

impl NodeConfig {
    pub fn new(body: NodeBody) -> Self {
        Self {
            body,
            inputs: None,
            context: None,
            input_transform: None,
            data_targets: Vec::new(),
            error_targets: Vec::new(),
            metadata: Value::Object(Map::new()),
            extra: Map::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("NodeConfig always serializes")
    }
}
