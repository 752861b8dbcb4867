//! Error types for the data store and commit interface (spec §7,
//! infrastructure kinds).

use thiserror::Error;

/// Errors raised by the data store, reader, and commit executor.
///
/// Infrastructure failures (`Persistence`, `Messaging`) are always surfaced
/// as a fatal error rather than silently swallowed (§7).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("flow not found: {0}")]
    FlowNotFound(uuid::Uuid),

    #[error("duplicate data_id within flow: {0}")]
    DuplicateDataId(uuid::Uuid),

    #[error("node not found: {0}")]
    NodeNotFound(uuid::Uuid),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("messaging failure: {0}")]
    Messaging(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
