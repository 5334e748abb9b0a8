//! Latent Dirichlet allocation fitted with batch variational Bayes.
//!
//! The topic-word matrix holds the variational parameter `λ` (unnormalized,
//! like a pseudo-count); document rows are the normalized `γ`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::backend::{check_transform_shape, Factorization, Factors};
use crate::utils::math::digamma;
use crate::utils::math::matrix::DenseMatrix;
use crate::utils::math::vector::ZeroSpVec;
use crate::utils::normalizer::normalize_distribution;

const MAX_DOC_ITER: usize = 100;
const MEAN_CHANGE_TOL: f64 = 1e-3;
const PHI_FLOOR: f64 = 1e-100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lda {
    pub max_iter: usize,
    pub seed: u64,
}

/// Per-document E-step output
struct DocEstimate {
    gamma: Vec<f64>,
    /// `(word_id, per-topic sufficient statistic)` for each stored word
    sstats: Vec<(usize, Vec<f64>)>,
}

impl Lda {
    pub fn new(max_iter: usize, seed: u64) -> Self {
        Lda { max_iter, seed }
    }

    fn doc_topic_prior(nb_topics: usize) -> f64 {
        1.0 / nb_topics as f64
    }

    fn topic_word_prior(nb_topics: usize) -> f64 {
        0.01 / nb_topics as f64
    }

    /// `exp(E[log β])` for every topic row of `λ`
    fn exp_elog_beta(lambda: &DenseMatrix) -> DenseMatrix {
        let mut out = lambda.clone();
        out.par_rows_mut().for_each(|row| {
            let total: f64 = row.iter().map(|&v| v as f64).sum();
            let psi_total = digamma(total);
            for v in row.iter_mut() {
                *v = (digamma(*v as f64) - psi_total).exp() as f32;
            }
        });
        out
    }

    fn estimate_doc(row: &ZeroSpVec<f32>, exp_beta: &DenseMatrix, alpha: f64, with_sstats: bool) -> DocEstimate {
        let k = exp_beta.rows();
        let mut gamma = vec![1.0f64; k];
        let ids: Vec<usize> = row.indices().iter().map(|&i| i as usize).collect();
        let counts: Vec<f64> = row.values().iter().map(|&v| v as f64).collect();
        // a document without terms carries no topic evidence
        if ids.is_empty() {
            gamma.iter_mut().for_each(|g| *g = 0.0);
            return DocEstimate {
                gamma,
                sstats: Vec::new(),
            };
        }

        let mut exp_theta = exp_elog_theta(&gamma);
        let mut phinorm = vec![0.0f64; ids.len()];
        for _ in 0..MAX_DOC_ITER {
            for (n, &j) in ids.iter().enumerate() {
                phinorm[n] = (0..k)
                    .map(|t| exp_theta[t] * exp_beta.get(t, j) as f64)
                    .sum::<f64>()
                    + PHI_FLOOR;
            }
            let mut change = 0.0;
            for t in 0..k {
                let dot: f64 = ids
                    .iter()
                    .zip(&counts)
                    .zip(&phinorm)
                    .map(|((&j, &c), &p)| c / p * exp_beta.get(t, j) as f64)
                    .sum();
                let updated = alpha + exp_theta[t] * dot;
                change += (updated - gamma[t]).abs();
                gamma[t] = updated;
            }
            exp_theta = exp_elog_theta(&gamma);
            if change / (k as f64) < MEAN_CHANGE_TOL {
                break;
            }
        }

        let sstats = if with_sstats {
            for (n, &j) in ids.iter().enumerate() {
                phinorm[n] = (0..k)
                    .map(|t| exp_theta[t] * exp_beta.get(t, j) as f64)
                    .sum::<f64>()
                    + PHI_FLOOR;
            }
            ids.iter()
                .zip(&counts)
                .zip(&phinorm)
                .map(|((&j, &c), &p)| (j, exp_theta.iter().map(|&e| e * c / p).collect()))
                .collect()
        } else {
            Vec::new()
        };
        DocEstimate { gamma, sstats }
    }

    fn e_step(rows: &[ZeroSpVec<f32>], exp_beta: &DenseMatrix, alpha: f64, with_sstats: bool) -> Vec<DocEstimate> {
        rows.par_iter()
            .map(|row| Lda::estimate_doc(row, exp_beta, alpha, with_sstats))
            .collect()
    }

    fn gamma_matrix(estimates: &[DocEstimate], nb_topics: usize) -> DenseMatrix {
        let mut out = DenseMatrix::zeros(estimates.len(), nb_topics);
        for (d, est) in estimates.iter().enumerate() {
            let gamma: Vec<f32> = est.gamma.iter().map(|&g| g as f32).collect();
            out.row_mut(d).copy_from_slice(&normalize_distribution(&gamma));
        }
        out
    }
}

fn exp_elog_theta(gamma: &[f64]) -> Vec<f64> {
    let psi_total = digamma(gamma.iter().sum());
    gamma.iter().map(|&g| (digamma(g) - psi_total).exp()).collect()
}

impl Factorization for Lda {
    fn fit(&self, rows: &[ZeroSpVec<f32>], dim: usize, nb_topics: usize) -> Result<Factors> {
        let alpha = Lda::doc_topic_prior(nb_topics);
        let eta = Lda::topic_word_prior(nb_topics);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut lambda = DenseMatrix::from_fn(nb_topics, dim, |_, _| rng.gen_range(0.5f32..1.5));

        for iter in 0..self.max_iter {
            let exp_beta = Lda::exp_elog_beta(&lambda);
            let estimates = Lda::e_step(rows, &exp_beta, alpha, true);
            // accumulate in document order
            let mut sstats = vec![0.0f64; nb_topics * dim];
            for est in &estimates {
                for (j, per_topic) in &est.sstats {
                    for (t, &s) in per_topic.iter().enumerate() {
                        sstats[t * dim + j] += s;
                    }
                }
            }
            for t in 0..nb_topics {
                for j in 0..dim {
                    let updated = eta + sstats[t * dim + j] * exp_beta.get(t, j) as f64;
                    lambda.set(t, j, updated as f32);
                }
            }
            if iter % 10 == 0 {
                debug!(target: "topic_explorer::model", iter, "LDA iteration");
            }
        }

        let exp_beta = Lda::exp_elog_beta(&lambda);
        let estimates = Lda::e_step(rows, &exp_beta, alpha, false);
        Ok(Factors {
            doc_topic: Lda::gamma_matrix(&estimates, nb_topics),
            topic_word: lambda,
        })
    }

    fn transform(&self, rows: &[ZeroSpVec<f32>], topic_word: &DenseMatrix) -> Result<DenseMatrix> {
        check_transform_shape(rows, topic_word)?;
        let nb_topics = topic_word.rows();
        let exp_beta = Lda::exp_elog_beta(topic_word);
        let estimates = Lda::e_step(rows, &exp_beta, Lda::doc_topic_prior(nb_topics), false);
        Ok(Lda::gamma_matrix(&estimates, nb_topics))
    }

    fn normalized_rows(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_rows() -> Vec<ZeroSpVec<f32>> {
        vec![
            ZeroSpVec::from_dense(&[5.0, 4.0, 0.0, 0.0]),
            ZeroSpVec::from_dense(&[4.0, 5.0, 0.0, 0.0]),
            ZeroSpVec::from_dense(&[0.0, 0.0, 5.0, 4.0]),
            ZeroSpVec::from_dense(&[0.0, 0.0, 4.0, 5.0]),
        ]
    }

    #[test]
    fn document_rows_are_distributions() {
        let factors = Lda::new(20, 2).fit(&block_rows(), 4, 2).unwrap();
        for d in 0..4 {
            let sum: f32 = factors.doc_topic.row(d).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert!(factors.topic_word.as_slice().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let a = Lda::new(10, 9).fit(&block_rows(), 4, 3).unwrap();
        let b = Lda::new(10, 9).fit(&block_rows(), 4, 3).unwrap();
        assert_eq!(a.doc_topic, b.doc_topic);
        assert_eq!(a.topic_word, b.topic_word);
    }

    #[test]
    fn empty_documents_get_a_zero_row() {
        let lda = Lda::new(10, 1);
        let factors = lda.fit(&block_rows(), 4, 2).unwrap();
        let d = lda
            .transform(&[ZeroSpVec::zeros(4), ZeroSpVec::from_dense(&[5.0, 4.0, 0.0, 0.0])], &factors.topic_word)
            .unwrap();
        assert_eq!(d.row(0), &[0.0f32, 0.0]);
        assert!((d.row(1).iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
