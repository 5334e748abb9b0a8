use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::lda::Lda;
use crate::model::nmf::Nmf;
use crate::utils::math::matrix::DenseMatrix;
use crate::utils::math::vector::ZeroSpVec;

/// Factorization algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Nmf,
    Lda,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nmf" => Ok(Algorithm::Nmf),
            "lda" => Ok(Algorithm::Lda),
            other => Err(Error::configuration(format!(
                "unknown topic modeling algorithm '{other}', expected \"nmf\" or \"lda\""
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Nmf => write!(f, "nmf"),
            Algorithm::Lda => write!(f, "lda"),
        }
    }
}

/// Fitted factors of a document-term matrix
#[derive(Debug, Clone)]
pub struct Factors {
    /// docs × k
    pub doc_topic: DenseMatrix,
    /// k × vocabulary
    pub topic_word: DenseMatrix,
}

/// Non-negative factorization of a sparse document-term matrix.
///
/// Implementations must be deterministic for a fixed seed and input.
pub trait Factorization {
    /// Fit `nb_topics` topics over `rows` (each of logical length `dim`)
    fn fit(&self, rows: &[ZeroSpVec<f32>], dim: usize, nb_topics: usize) -> Result<Factors>;

    /// Document-topic weights of `rows` against a fixed topic-word matrix
    fn transform(&self, rows: &[ZeroSpVec<f32>], topic_word: &DenseMatrix) -> Result<DenseMatrix>;

    /// True when output document rows already sum to 1 (all-zero rows of
    /// empty documents aside)
    fn normalized_rows(&self) -> bool;
}

/// Backend selected by configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum Backend {
    Nmf(Nmf),
    Lda(Lda),
}

impl Backend {
    pub fn new(algorithm: Algorithm, max_iter: usize, seed: u64) -> Self {
        match algorithm {
            Algorithm::Nmf => Backend::Nmf(Nmf::new(max_iter, seed)),
            Algorithm::Lda => Backend::Lda(Lda::new(max_iter, seed)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Backend::Nmf(_) => Algorithm::Nmf,
            Backend::Lda(_) => Algorithm::Lda,
        }
    }
}

impl Factorization for Backend {
    fn fit(&self, rows: &[ZeroSpVec<f32>], dim: usize, nb_topics: usize) -> Result<Factors> {
        match self {
            Backend::Nmf(nmf) => nmf.fit(rows, dim, nb_topics),
            Backend::Lda(lda) => lda.fit(rows, dim, nb_topics),
        }
    }

    fn transform(&self, rows: &[ZeroSpVec<f32>], topic_word: &DenseMatrix) -> Result<DenseMatrix> {
        match self {
            Backend::Nmf(nmf) => nmf.transform(rows, topic_word),
            Backend::Lda(lda) => lda.transform(rows, topic_word),
        }
    }

    fn normalized_rows(&self) -> bool {
        match self {
            Backend::Nmf(nmf) => nmf.normalized_rows(),
            Backend::Lda(lda) => lda.normalized_rows(),
        }
    }
}

/// Shared shape checks for `transform`
pub(crate) fn check_transform_shape(rows: &[ZeroSpVec<f32>], topic_word: &DenseMatrix) -> Result<()> {
    if let Some(row) = rows.iter().find(|r| r.len() != topic_word.cols()) {
        return Err(Error::configuration(format!(
            "document vectors of length {} do not match a topic-word matrix over {} words",
            row.len(),
            topic_word.cols()
        )));
    }
    Ok(())
}
