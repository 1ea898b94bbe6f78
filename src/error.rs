//! Crate-wide error type.

use crate::types::{LabelId, PropertyType, Vid};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] bincode::Error),
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("unknown label `{0}`")]
    UnknownLabel(String),
    #[error("label id {0} is out of range")]
    LabelOutOfRange(LabelId),
    #[error("label `{0}` is already registered")]
    DuplicateLabel(String),
    #[error("too many labels (max {0})")]
    TooManyLabels(usize),
    #[error("edge triplet ({src}, {dst}, {edge}) is not configured")]
    EdgeTripletNotFound { src: LabelId, dst: LabelId, edge: LabelId },
    #[error("edges carry at most one property, got {0}")]
    TooManyEdgeProperties(usize),
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: PropertyType, found: PropertyType },
    #[error("row has {found} values but the table has {expected} columns")]
    ColumnCountMismatch { expected: usize, found: usize },
    #[error("no column named `{0}`")]
    UnknownColumn(String),
    #[error("{what} capacity exceeded (capacity {capacity})")]
    CapacityExceeded { what: &'static str, capacity: usize },
    #[error("single-edge slot of vertex {0} is already occupied")]
    SingleEdgeOccupied(Vid),
    #[error("string of {0} bytes exceeds the 65535-byte item limit")]
    StringTooLong(usize),
    #[error("{path}:{line}: {message}")]
    Parse { path: PathBuf, line: usize, message: String },
    #[error("invalid value `{value}` for {ty:?}")]
    InvalidValue { ty: PropertyType, value: String },
    #[error("corrupt file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("vertex {0} not found")]
    VertexNotFound(i64),
    #[error("vertex {vid} has no edge at position {position}")]
    EdgeNotFound { vid: Vid, position: usize },
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl GraphError {
    pub(crate) fn corrupt(path: &std::path::Path, message: impl Into<String>) -> Self {
        GraphError::Corrupt { path: path.to_path_buf(), message: message.into() }
    }
}
