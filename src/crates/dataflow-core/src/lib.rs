//! Compiler, router, and workflow-state engine for the dataflow workflow
//! engine (spec §4). Built on top of [`dataflow_store`], which owns the
//! persisted entities (flows, nodes, data records) and the commit
//! interface.
//!
//! - [`ops`] / [`node_config`]: the builder-operation and node-config schema
//!   the compiler consumes and emits.
//! - [`expr`]: the expression-evaluator trait the router and cycle/parallel
//!   nodes call into for conditions and transforms.
//! - [`compiler`]: builder ops -> validated DAG -> `Command` list (§4.1).
//! - [`routing`]: input-merge and completion-routing semantics (§4.5-§4.6).
//! - [`engine`]: crash-tolerant load/replay and the yield protocol (§4.3).
//! - [`scheduler`]: the pure `find_next_work` decision function (§4.4).

pub mod compiler;
pub mod engine;
pub mod error;
pub mod expr;
pub mod node_config;
pub mod ops;
pub mod routing;
pub mod scheduler;

pub use dataflow_store::{
    new_id, Command, CommandResult, CommitExecutor, CommitOptions, CommitResult, CreateData,
    CreateNode, DataRecord, DataRecordType, DataReader, DataTable, Flow, FlowStatus,
    InMemoryStore, Node, NodeStatus, OrderDir, OrderField, ResolvedRecord, Result as StoreResult,
    StoreError, UpdateNode, UpdateWorkflow, CONTENT_TYPE_REFERENCE, DEFAULT_DISCRIMINATOR,
};

pub use compiler::{compile, CompileOutput};
pub use engine::{
    load_state, process_commands, satisfy_yield, FlowState, InputTracker, YieldContext, YieldInfo,
    YieldTable,
};
pub use error::{CompileError, EngineError, RoutingError};
pub use expr::{BuiltinEvaluator, EvalError, EvalResult, ExpressionEvaluator};
pub use node_config::{
    AgentConfig, ArenaConfig, CycleConfig, DataTarget, FilterMode, FuncConfig, InputTransform,
    InputsSpec, NodeBody, NodeConfig, NodeKind, OnError, OutputMode, ParallelConfig, StateConfig,
    TemplateOps, ToolCalling,
};
pub use ops::{flatten_ops, Operation, SessionContext};
pub use routing::{merge_inputs, route_completion, RoutedRecord};
pub use scheduler::{find_next_work, Decision, SchedulerConfig};
