//! Topic-count stability (Greene, O'Callaghan & Cunningham, 2014).
//!
//! For each candidate k a reference model is fitted on the whole corpus and
//! compared with models fitted on random subsamples. Agreement between two
//! models is the mean, over reference topics, of the best average Jaccard
//! score of their top-word rankings.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::corpus::{Corpus, RawDocument};
use crate::error::{Error, Result};
use crate::model::backend::Backend;
use crate::model::TopicModel;
use crate::vectorizer::VectorizerParams;

#[derive(Debug, Clone)]
pub struct StabilityParams {
    pub min_topics: usize,
    pub max_topics: usize,
    pub step: usize,
    pub top_n_words: usize,
    /// subsampled models per k
    pub samples: usize,
    /// share of documents kept in each subsample
    pub sample_ratio: f64,
    pub seed: u64,
}

impl Default for StabilityParams {
    fn default() -> Self {
        StabilityParams {
            min_topics: 10,
            max_topics: 20,
            step: 1,
            top_n_words: 10,
            samples: 10,
            sample_ratio: 0.8,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityScore {
    pub nb_topics: usize,
    pub stability: f64,
}

/// Average Jaccard similarity of two rankings of equal length:
/// the mean of the Jaccard index of every pair of prefixes.
pub fn average_jaccard<T: Eq + std::hash::Hash>(a: &[T], b: &[T]) -> f64 {
    let depth = a.len().min(b.len());
    if depth == 0 {
        return 0.0;
    }
    let mut seen_a: HashSet<&T> = HashSet::with_capacity(depth);
    let mut seen_b: HashSet<&T> = HashSet::with_capacity(depth);
    let mut total = 0.0;
    for d in 0..depth {
        seen_a.insert(&a[d]);
        seen_b.insert(&b[d]);
        let inter = seen_a.intersection(&seen_b).count();
        let union = seen_a.union(&seen_b).count();
        total += inter as f64 / union as f64;
    }
    total / depth as f64
}

/// Mean over `reference` rankings of the best `average_jaccard` match in `other`
pub fn agreement_score<T: Eq + std::hash::Hash>(reference: &[Vec<T>], other: &[Vec<T>]) -> f64 {
    if reference.is_empty() || other.is_empty() {
        return 0.0;
    }
    let sum: f64 = reference
        .iter()
        .map(|r| {
            other
                .iter()
                .map(|o| average_jaccard(r, o))
                .fold(0.0, f64::max)
        })
        .sum();
    sum / reference.len() as f64
}

fn topic_rankings(model: &TopicModel, top_n: usize) -> Result<Vec<Vec<String>>> {
    (0..model.nb_topics())
        .map(|t| {
            Ok(model
                .top_words(t, top_n)?
                .into_iter()
                .map(|(word, _)| word)
                .collect())
        })
        .collect()
}

/// Stability of every k in `[min_topics, max_topics]` by `step`
pub fn greene_metric(
    docs: &[RawDocument],
    vectorizer: &VectorizerParams,
    backend: &Backend,
    params: &StabilityParams,
) -> Result<Vec<StabilityScore>> {
    if params.step == 0 || params.min_topics == 0 || params.min_topics > params.max_topics {
        return Err(Error::configuration(format!(
            "invalid topic range {}..={} step {}",
            params.min_topics, params.max_topics, params.step
        )));
    }
    if !(0.0..=1.0).contains(&params.sample_ratio) {
        return Err(Error::configuration("sample_ratio must lie in [0, 1]"));
    }

    let reference_corpus = Arc::new(Corpus::fit(docs.to_vec(), vectorizer.clone())?);
    let sample_size = ((docs.len() as f64) * params.sample_ratio).round() as usize;
    let mut rng = StdRng::seed_from_u64(params.seed);

    // subsample corpora are shared by every k
    let mut sample_corpora = Vec::with_capacity(params.samples);
    for _ in 0..params.samples {
        let mut picked: Vec<usize> = sample(&mut rng, docs.len(), sample_size).into_vec();
        picked.sort_unstable();
        let subset: Vec<RawDocument> = picked.into_iter().map(|i| docs[i].clone()).collect();
        sample_corpora.push(Arc::new(Corpus::fit(subset, vectorizer.clone())?));
    }

    let mut scores = Vec::new();
    for k in (params.min_topics..=params.max_topics).step_by(params.step) {
        let reference = TopicModel::infer_topics(Arc::clone(&reference_corpus), backend.clone(), k)?;
        let reference_rank = topic_rankings(&reference, params.top_n_words)?;
        let mut agreement = 0.0;
        for corpus in &sample_corpora {
            let model = TopicModel::infer_topics(Arc::clone(corpus), backend.clone(), k)?;
            agreement += agreement_score(&reference_rank, &topic_rankings(&model, params.top_n_words)?);
        }
        let stability = if sample_corpora.is_empty() {
            0.0
        } else {
            agreement / sample_corpora.len() as f64
        };
        info!(target: "topic_explorer::stability", nb_topics = k, stability, "Stability evaluated");
        scores.push(StabilityScore { nb_topics: k, stability });
    }
    Ok(scores)
}
