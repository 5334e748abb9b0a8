//! Non-negative matrix factorization with multiplicative updates.
//!
//! Minimizes `||X - D W||²` (Frobenius) with the Lee–Seung rules:
//! `W ← W ∘ (DᵀX) / (DᵀD W)` and `D ← D ∘ (X Wᵀ) / (D W Wᵀ)`.
//! Every product sums in a fixed order, so a fixed seed reproduces the
//! same factors regardless of the thread count.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::backend::{check_transform_shape, Factorization, Factors};
use crate::utils::math::matrix::DenseMatrix;
use crate::utils::math::vector::ZeroSpVec;

const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nmf {
    pub max_iter: usize,
    pub seed: u64,
}

impl Nmf {
    pub fn new(max_iter: usize, seed: u64) -> Self {
        Nmf { max_iter, seed }
    }

    /// `sqrt(mean(X) / k)`, the scale of the random initialization
    fn init_scale(rows: &[ZeroSpVec<f32>], dim: usize, nb_topics: usize) -> f64 {
        let cells = (rows.len() * dim).max(1) as f64;
        let total: f64 = rows
            .iter()
            .flat_map(|r| r.values().iter())
            .map(|&v| v as f64)
            .sum();
        (total / cells / nb_topics.max(1) as f64).sqrt()
    }

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize, scale: f64) -> DenseMatrix {
        DenseMatrix::from_fn(rows, cols, |_, _| (scale * rng.gen_range(0.01..1.0)) as f32)
    }

    /// `D ← D ∘ (X Wᵀ) / (D W Wᵀ)`, one document per task
    fn update_doc_topic(rows: &[ZeroSpVec<f32>], doc_topic: &mut DenseMatrix, topic_word: &DenseMatrix) {
        let k = topic_word.rows();
        let wwt = gram_rows(topic_word);
        doc_topic
            .par_rows_mut()
            .zip(rows.par_iter())
            .for_each(|(d_row, x_row)| {
                let mut numer = vec![0.0f64; k];
                for (j, x) in x_row.raw_iter() {
                    for t in 0..k {
                        numer[t] += x as f64 * topic_word.get(t, j) as f64;
                    }
                }
                let current: Vec<f64> = d_row.iter().map(|&v| v as f64).collect();
                for t in 0..k {
                    let denom: f64 = (0..k).map(|s| current[s] * wwt[s * k + t]).sum::<f64>() + EPSILON;
                    d_row[t] = (current[t] * numer[t] / denom) as f32;
                }
            });
    }

    /// `W ← W ∘ (DᵀX) / (DᵀD W)`, one topic per task
    fn update_topic_word(rows: &[ZeroSpVec<f32>], doc_topic: &DenseMatrix, topic_word: &mut DenseMatrix) {
        let k = doc_topic.cols();
        let dim = topic_word.cols();
        let dtd = gram_cols(doc_topic);
        let current = topic_word.clone();
        topic_word
            .par_rows_mut()
            .enumerate()
            .for_each(|(t, w_row)| {
                let mut numer = vec![0.0f64; dim];
                for (d, x_row) in rows.iter().enumerate() {
                    let weight = doc_topic.get(d, t) as f64;
                    if weight == 0.0 {
                        continue;
                    }
                    for (j, x) in x_row.raw_iter() {
                        numer[j] += weight * x as f64;
                    }
                }
                for j in 0..dim {
                    let denom: f64 = (0..k)
                        .map(|s| dtd[t * k + s] * current.get(s, j) as f64)
                        .sum::<f64>()
                        + EPSILON;
                    w_row[j] = (current.get(t, j) as f64 * numer[j] / denom) as f32;
                }
            });
    }
}

/// `W Wᵀ` (k × k) for a k × m matrix, row-major
fn gram_rows(m: &DenseMatrix) -> Vec<f64> {
    let k = m.rows();
    let mut out = vec![0.0f64; k * k];
    for a in 0..k {
        for b in a..k {
            let dot: f64 = m
                .row(a)
                .iter()
                .zip(m.row(b))
                .map(|(&x, &y)| x as f64 * y as f64)
                .sum();
            out[a * k + b] = dot;
            out[b * k + a] = dot;
        }
    }
    out
}

/// `Dᵀ D` (k × k) for an n × k matrix, row-major
fn gram_cols(m: &DenseMatrix) -> Vec<f64> {
    let k = m.cols();
    let mut out = vec![0.0f64; k * k];
    for row in m.iter_rows().take(m.rows()) {
        for a in 0..k {
            let x = row[a] as f64;
            if x == 0.0 {
                continue;
            }
            for b in 0..k {
                out[a * k + b] += x * row[b] as f64;
            }
        }
    }
    out
}

impl Factorization for Nmf {
    fn fit(&self, rows: &[ZeroSpVec<f32>], dim: usize, nb_topics: usize) -> Result<Factors> {
        let scale = Nmf::init_scale(rows, dim, nb_topics);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut doc_topic = Nmf::random_matrix(&mut rng, rows.len(), nb_topics, scale);
        let mut topic_word = Nmf::random_matrix(&mut rng, nb_topics, dim, scale);

        for iter in 0..self.max_iter {
            Nmf::update_topic_word(rows, &doc_topic, &mut topic_word);
            Nmf::update_doc_topic(rows, &mut doc_topic, &topic_word);
            if iter % 50 == 0 {
                debug!(target: "topic_explorer::model", iter, "NMF iteration");
            }
        }
        Ok(Factors {
            doc_topic,
            topic_word,
        })
    }

    fn transform(&self, rows: &[ZeroSpVec<f32>], topic_word: &DenseMatrix) -> Result<DenseMatrix> {
        check_transform_shape(rows, topic_word)?;
        let nb_topics = topic_word.rows();
        let scale = Nmf::init_scale(rows, topic_word.cols(), nb_topics);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut doc_topic = Nmf::random_matrix(&mut rng, rows.len(), nb_topics, scale);
        for _ in 0..self.max_iter {
            Nmf::update_doc_topic(rows, &mut doc_topic, topic_word);
        }
        Ok(doc_topic)
    }

    fn normalized_rows(&self) -> bool {
        false
    }
}
