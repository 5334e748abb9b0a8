//! Error types for the topic explorer.
//!
//! One `thiserror` enum covers every stage of the pipeline. The query layer
//! maps `MissingEntity` to `None`/empty results instead of surfacing it.

use std::io;
use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of entity a lookup failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Document,
    Word,
    Topic,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Document => write!(f, "document"),
            EntityKind::Word => write!(f, "word"),
            EntityKind::Topic => write!(f, "topic"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unknown configuration value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Document-frequency filters removed every term
    #[error("empty vocabulary: frequency filters (min_df={min_df}, max_df={max_df}) removed every term across {documents} documents")]
    EmptyVocabulary {
        documents: usize,
        min_df: usize,
        max_df: usize,
    },

    /// Id outside the range of the fitted corpus or model
    #[error("{kind} {id} does not exist")]
    MissingEntity { kind: EntityKind, id: usize },

    /// Every vector of the corpus is zero
    #[error("degenerate corpus: {0}")]
    DegenerateCorpus(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR or TOML encoding failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Worker pool or writer channel failure
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn missing(kind: EntityKind, id: usize) -> Self {
        Error::MissingEntity { kind, id }
    }
}

impl From<serde_cbor::Error> for Error {
    fn from(e: serde_cbor::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
