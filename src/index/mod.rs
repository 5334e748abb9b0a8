//! Nearest-neighbor indices over document (or word) vectors.
//!
//! Similarity is cosine clamped into `[0, 1]`, i.e. `1 - cosine distance`.
//! Results exclude the query item and are ordered by descending similarity,
//! ties by ascending id.

pub mod exact;
pub mod forest;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EntityKind, Error, Result};
use crate::index::exact::ExactIndex;
use crate::index::forest::ForestIndex;
use crate::utils::math::cosine_dense;
use crate::utils::math::matrix::DenseMatrix;
use crate::utils::math::vector::ZeroSpVec;

/// Items an index ranks
pub trait VectorSpace: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cosine similarity of items `a` and `b`, 0.0 when either is all-zero
    fn cosine(&self, a: usize, b: usize) -> f64;

    fn is_zero(&self, item: usize) -> bool;
}

/// Sparse rows, e.g. document term vectors
#[derive(Debug, Clone)]
pub struct SparseSpace {
    rows: Vec<ZeroSpVec<f32>>,
    norms: Vec<f64>,
}

impl SparseSpace {
    pub fn new(rows: Vec<ZeroSpVec<f32>>) -> Self {
        let norms = rows.iter().map(ZeroSpVec::norm).collect();
        SparseSpace { rows, norms }
    }
}

impl VectorSpace for SparseSpace {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn cosine(&self, a: usize, b: usize) -> f64 {
        let denom = self.norms[a] * self.norms[b];
        if denom == 0.0 {
            return 0.0;
        }
        self.rows[a].dot(&self.rows[b]) / denom
    }

    fn is_zero(&self, item: usize) -> bool {
        self.norms[item] == 0.0
    }
}

/// Dense rows, e.g. document topic weights
#[derive(Debug, Clone)]
pub struct DenseSpace {
    rows: DenseMatrix,
    zero: Vec<bool>,
}

impl DenseSpace {
    pub fn new(rows: DenseMatrix) -> Self {
        let zero = (0..rows.rows())
            .map(|r| rows.row(r).iter().all(|&v| v == 0.0))
            .collect();
        DenseSpace { rows, zero }
    }
}

impl VectorSpace for DenseSpace {
    fn len(&self) -> usize {
        self.rows.rows()
    }

    fn cosine(&self, a: usize, b: usize) -> f64 {
        cosine_dense(self.rows.row(a), self.rows.row(b))
    }

    fn is_zero(&self, item: usize) -> bool {
        self.zero[item]
    }
}

/// `1 - cosine distance`, clamped into `[0, 1]`
#[inline]
pub(crate) fn similarity<S: VectorSpace + ?Sized>(space: &S, a: usize, b: usize) -> f32 {
    space.cosine(a, b).clamp(0.0, 1.0) as f32
}

pub trait SimilarityIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` `(other_id, similarity)` pairs for `item`, self excluded
    fn query(&self, item: usize, k: usize) -> Result<Vec<(usize, f32)>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStrategy {
    Exact,
    Forest,
    /// exact up to `exact_threshold` items, forest above
    Auto,
}

impl FromStr for IndexStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(IndexStrategy::Exact),
            "forest" => Ok(IndexStrategy::Forest),
            "auto" => Ok(IndexStrategy::Auto),
            other => Err(Error::configuration(format!(
                "unknown similarity strategy '{other}', expected \"exact\", \"forest\" or \"auto\""
            ))),
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStrategy::Exact => write!(f, "exact"),
            IndexStrategy::Forest => write!(f, "forest"),
            IndexStrategy::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub strategy: IndexStrategy,
    pub exact_threshold: usize,
    pub nb_trees: usize,
    pub leaf_size: usize,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            strategy: IndexStrategy::Auto,
            exact_threshold: 10_000,
            nb_trees: 10,
            leaf_size: 64,
            seed: 42,
        }
    }
}

/// Build an index over `space`.
///
/// # Errors
/// `DegenerateCorpus` when the space is empty or every item is all-zero.
pub fn build_index<S>(space: S, kind: EntityKind, params: &IndexParams) -> Result<Box<dyn SimilarityIndex>>
where
    S: VectorSpace + 'static,
{
    if space.is_empty() || (0..space.len()).all(|i| space.is_zero(i)) {
        return Err(Error::DegenerateCorpus(format!(
            "every {kind} vector of the {} indexed is zero",
            space.len()
        )));
    }
    let use_forest = match params.strategy {
        IndexStrategy::Exact => false,
        IndexStrategy::Forest => true,
        IndexStrategy::Auto => space.len() > params.exact_threshold,
    };
    info!(
        target: "topic_explorer::index",
        items = space.len(),
        kind = %kind,
        strategy = if use_forest { "forest" } else { "exact" },
        "Building similarity index"
    );
    if use_forest {
        Ok(Box::new(ForestIndex::build(space, kind, params)))
    } else {
        Ok(Box::new(ExactIndex::new(space, kind)))
    }
}
