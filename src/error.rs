//! Crate-wide error taxonomy.
//!
//! Each component defines its own error enum (`NodeError`, `CodecError`,
//! `StorageError`, `ModelError`, ...); this module aggregates them behind
//! one `EngineError` so callers that don't care which layer failed can
//! use `?` throughout. Individual components still return their own,
//! narrower error type where that is more useful (accessors, codec).

use thiserror::Error;

use crate::codec::CodecError;
use crate::model::ModelError;
use crate::node::NodeError;
use crate::storage::StorageError;

/// Top-level error taxonomy (spec §7): Argument, Resource, Backend,
/// Concurrency, Not-supported, Decode.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type EngineResult<T> = Result<T, EngineError>;
