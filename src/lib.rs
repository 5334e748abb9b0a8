/// This crate turns a cleaned text corpus into a browsable topic model:
/// sparse vectorization, NMF/LDA topics, similarity indices, and aggregate
/// tables stored in SQLite behind a read-only query layer.
pub mod aggregate;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod utils;
pub mod vectorizer;

pub use error::{EntityKind, Error, Result};

/// Vectorizer
/// Learns a vocabulary from whitespace-tokenized texts and produces one
/// sparse row per document, weighted by raw counts (`tf`) or by
/// L2-normalized `tf-idf`.
///
/// Vocabulary ids follow ascending surface form. A fitted vectorizer reused
/// on another document set keeps the ids and idf of its fit pass.
///
/// # Serialization
/// Supported through `VectorizerData`.
pub use vectorizer::{DocFrequency, Vectorizer, VectorizerParams, Weighting};

/// Vectorizer Data Structure for Serialization
/// Plain fields of a fitted `Vectorizer`; the term index is rebuilt on load.
pub use vectorizer::serde::VectorizerData;

/// Corpus
/// Ordered documents with their metadata, sparse rows and per-word postings.
/// Built once per run and shared read-only through `Arc<Corpus>`.
pub use corpus::{Corpus, Document, RawDocument};

/// Topic Model
/// Binds a corpus to a fitted factorization (document-topic `D`, topic-word
/// `W`). Every distribution it surfaces is normalized, or all-zero when the
/// weights are.
pub use model::TopicModel;

/// Factorization backends
/// `Backend` is the serializable tagged choice between `Nmf` and `Lda`,
/// both behind the `Factorization` trait.
pub use model::backend::{Algorithm, Backend, Factorization};

/// Similarity index
/// `build_index` picks an exact cosine scan or a random-projection forest
/// over any `VectorSpace`. Results exclude the query item, score in [0, 1]
/// and come back in descending order, ties by ascending id.
pub use index::{build_index, IndexParams, IndexStrategy, SimilarityIndex, VectorSpace};

/// Pipeline configuration read from TOML
pub use config::Config;

/// Read-only query layer over the stored tables
pub use query::{DocRef, Explorer};

/// Time bucketing
pub use utils::time::{year_normalizer, TimeInterval};
