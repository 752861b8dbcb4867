//! Error types for compilation, routing, and the workflow-state engine /
//! scheduler (spec §7).
//!
//! The compiler is a pure function and returns the *first* error it meets
//! (§7 propagation policy); it never panics on malformed input.

use thiserror::Error;

/// Compile-time errors (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("duplicate name: '{0}' is already bound by an earlier as()")]
    DuplicateName(String),

    #[error("undefined reference: '{0}' was never introduced by as()")]
    UndefinedReference(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("dead node(s): {0:?} have no incoming edge and are unreachable from workflow input or static data")]
    DeadNodes(Vec<String>),

    #[error("no success path: the graph has no path from any root to a success terminal")]
    MissingSuccessPath,

    #[error("cannot use :when() with static data routes")]
    StaticWhen,

    #[error("node '{0}' declares args and also receives a default-discriminated input or string input_transform")]
    ArgsDefaultConflict(String),

    #[error("no source node: when() was called with no preceding route")]
    NoSourceNode,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Runtime routing errors (§7). `ConditionEval` is fatal on data targets but
/// tolerated (skipped) on error targets, to avoid masking the original
/// node failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("transform evaluation failed: {0}")]
    TransformEval(String),

    #[error("condition evaluation failed: {0}")]
    ConditionEval(String),
}

/// State/scheduler errors (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("yield deadlock at parent {parent}")]
    YieldDeadlock { parent: uuid::Uuid },

    #[error("no input data provided")]
    NoInputData,

    #[error("deadlocked")]
    Deadlocked,

    #[error("completed without producing output")]
    NoOutput,

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("messaging failure: {0}")]
    MessagingFailure(String),
}

impl From<dataflow_store::StoreError> for EngineError {
    fn from(e: dataflow_store::StoreError) -> Self {
        EngineError::PersistenceFailure(e.to_string())
    }
}
