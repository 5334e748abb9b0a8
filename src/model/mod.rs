//! Topic model adapter.
//!
//! `TopicModel` binds a `Corpus` to a fitted factorization and answers every
//! topic, document and word question the aggregation stage asks. Surfaced
//! distributions are always normalized, with an all-zero fallback.

pub mod artifact;
pub mod backend;
pub mod lda;
pub mod nmf;
pub mod stability;

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::corpus::Corpus;
use crate::error::{EntityKind, Error, Result};
use crate::model::backend::{Backend, Factorization};
use crate::utils::math::matrix::DenseMatrix;
use crate::utils::normalizer::{argmax, normalize_distribution};
use crate::utils::sort::{rank_desc, top_k_desc};

/// Ceiling of `top_documents(topic, None)`
pub const MAX_POSITIVE_DOCUMENTS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct TopicModel {
    corpus: Arc<Corpus>,
    backend: Backend,
    nb_topics: usize,
    /// docs × k
    doc_topic: DenseMatrix,
    /// k × vocabulary
    topic_word: DenseMatrix,
}

impl TopicModel {
    /// Fit `nb_topics` topics on `corpus`.
    ///
    /// # Errors
    /// `Configuration` when `nb_topics` is 0 or exceeds the number of
    /// documents or vocabulary terms.
    pub fn infer_topics(corpus: Arc<Corpus>, backend: Backend, nb_topics: usize) -> Result<TopicModel> {
        if nb_topics == 0 {
            return Err(Error::configuration("number of topics must be positive"));
        }
        if nb_topics > corpus.size() || nb_topics > corpus.vocabulary_size() {
            return Err(Error::configuration(format!(
                "{nb_topics} topics requested for {} documents over {} terms",
                corpus.size(),
                corpus.vocabulary_size()
            )));
        }
        let started = Instant::now();
        let factors = backend.fit(corpus.rows(), corpus.vocabulary_size(), nb_topics)?;
        info!(
            target: "topic_explorer::model",
            algorithm = %backend.algorithm(),
            nb_topics,
            documents = corpus.size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Topics inferred"
        );
        Ok(TopicModel {
            corpus,
            backend,
            nb_topics,
            doc_topic: factors.doc_topic,
            topic_word: factors.topic_word,
        })
    }

    /// Rebuild from stored matrices, e.g. a loaded artifact
    pub fn from_parts(
        corpus: Arc<Corpus>,
        backend: Backend,
        doc_topic: DenseMatrix,
        topic_word: DenseMatrix,
    ) -> Result<TopicModel> {
        let nb_topics = topic_word.rows();
        if doc_topic.cols() != nb_topics
            || doc_topic.rows() != corpus.size()
            || topic_word.cols() != corpus.vocabulary_size()
        {
            return Err(Error::configuration(format!(
                "model matrices {}x{} / {}x{} do not fit a corpus of {} documents over {} terms",
                doc_topic.rows(),
                doc_topic.cols(),
                topic_word.rows(),
                topic_word.cols(),
                corpus.size(),
                corpus.vocabulary_size()
            )));
        }
        Ok(TopicModel {
            corpus,
            backend,
            nb_topics,
            doc_topic,
            topic_word,
        })
    }

    /// Keep the topics and recompute document weights for `corpus`.
    ///
    /// # Errors
    /// `Configuration` when `corpus` was vectorized over another vocabulary.
    pub fn infer_and_replace(&mut self, corpus: Arc<Corpus>) -> Result<()> {
        if corpus.vocabulary_size() != self.topic_word.cols() {
            return Err(Error::configuration(format!(
                "corpus vocabulary of {} terms does not match the {} terms of the model",
                corpus.vocabulary_size(),
                self.topic_word.cols()
            )));
        }
        let started = Instant::now();
        self.doc_topic = self.backend.transform(corpus.rows(), &self.topic_word)?;
        info!(
            target: "topic_explorer::model",
            documents = corpus.size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document topics re-inferred"
        );
        self.corpus = corpus;
        Ok(())
    }

    #[inline]
    pub fn nb_topics(&self) -> usize {
        self.nb_topics
    }

    #[inline]
    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    #[inline]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    #[inline]
    pub fn doc_topic(&self) -> &DenseMatrix {
        &self.doc_topic
    }

    #[inline]
    pub fn topic_word(&self) -> &DenseMatrix {
        &self.topic_word
    }

    fn check_topic(&self, topic: usize) -> Result<()> {
        if topic < self.nb_topics {
            Ok(())
        } else {
            Err(Error::missing(EntityKind::Topic, topic))
        }
    }

    fn check_doc(&self, doc: usize) -> Result<()> {
        if doc < self.doc_topic.rows() {
            Ok(())
        } else {
            Err(Error::missing(EntityKind::Document, doc))
        }
    }

    fn check_word(&self, word: usize) -> Result<()> {
        if word < self.topic_word.cols() {
            Ok(())
        } else {
            Err(Error::missing(EntityKind::Word, word))
        }
    }

    /// Top `n` `(word_id, weight)` of `topic`, zero weights excluded.
    /// Descending weight, ties by ascending word id.
    pub fn top_word_ids(&self, topic: usize, n: usize) -> Result<Vec<(usize, f32)>> {
        self.check_topic(topic)?;
        let weights: Vec<(usize, f32)> = self
            .topic_word
            .row(topic)
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, w)| *w > 0.0)
            .collect();
        Ok(top_k_desc(weights, n))
    }

    /// `top_word_ids` with surface forms
    pub fn top_words(&self, topic: usize, n: usize) -> Result<Vec<(String, f32)>> {
        self.top_word_ids(topic, n)?
            .into_iter()
            .map(|(id, w)| Ok((self.corpus.word_for_id(id)?.to_string(), w)))
            .collect()
    }

    /// Documents by descending weight for `topic`, ties by ascending id.
    ///
    /// `None` keeps only strictly positive weights, at most
    /// `MAX_POSITIVE_DOCUMENTS` of them.
    pub fn top_documents(&self, topic: usize, n: Option<usize>) -> Result<Vec<(usize, f32)>> {
        self.check_topic(topic)?;
        let column = self.doc_topic.column(topic).into_iter().enumerate();
        let ranked = match n {
            Some(n) => top_k_desc(column.collect(), n),
            None => {
                let positive: Vec<(usize, f32)> = column.filter(|(_, w)| *w > 0.0).collect();
                top_k_desc(positive, MAX_POSITIVE_DOCUMENTS)
            }
        };
        Ok(ranked)
    }

    /// Normalized topic weights of `doc` (length `nb_topics`)
    pub fn topic_distribution_for_document(&self, doc: usize) -> Result<Vec<f32>> {
        self.check_doc(doc)?;
        Ok(normalize_distribution(self.doc_topic.row(doc)))
    }

    /// Normalized topic weights of `word` (length `nb_topics`)
    pub fn topic_distribution_for_word(&self, word: usize) -> Result<Vec<f32>> {
        self.check_word(word)?;
        Ok(normalize_distribution(&self.topic_word.column(word)))
    }

    /// Argmax of the document's weights, lowest topic id on ties
    pub fn most_likely_topic_for_document(&self, doc: usize) -> Result<usize> {
        self.check_doc(doc)?;
        Ok(argmax(self.doc_topic.row(doc)).unwrap_or(0))
    }

    fn doc_subset(&self, year: Option<i32>) -> Vec<usize> {
        match year {
            Some(year) => self.corpus.doc_ids(year),
            None => (0..self.doc_topic.rows()).collect(),
        }
    }

    fn dominant_topics(&self) -> Vec<usize> {
        (0..self.doc_topic.rows())
            .map(|d| argmax(self.doc_topic.row(d)).unwrap_or(0))
            .collect()
    }

    /// Share of documents (optionally of one year) whose most likely topic is
    /// `topic`. An empty subset yields 0.0.
    pub fn topic_frequency(&self, topic: usize, year: Option<i32>) -> Result<f64> {
        self.check_topic(topic)?;
        Ok(self.topics_frequency(year)[topic])
    }

    /// `topic_frequency` for every topic
    pub fn topics_frequency(&self, year: Option<i32>) -> Vec<f64> {
        let subset = self.doc_subset(year);
        let mut counts = vec![0usize; self.nb_topics];
        if subset.is_empty() {
            return vec![0.0; self.nb_topics];
        }
        let dominant = self.dominant_topics();
        for &d in &subset {
            counts[dominant[d]] += 1;
        }
        counts
            .into_iter()
            .map(|c| c as f64 / subset.len() as f64)
            .collect()
    }

    /// Documents whose most likely topic is `topic`, by ascending id
    pub fn documents_for_topic(&self, topic: usize) -> Result<Vec<usize>> {
        self.check_topic(topic)?;
        Ok(self.documents_per_topic().swap_remove(topic))
    }

    /// For each topic, the documents whose most likely topic it is
    pub fn documents_per_topic(&self) -> Vec<Vec<usize>> {
        let mut per_topic = vec![Vec::new(); self.nb_topics];
        for (d, t) in self.dominant_topics().into_iter().enumerate() {
            per_topic[t].push(d);
        }
        per_topic
    }

    /// Topic mass over total mass of the document-topic matrix.
    /// 0.0 when the matrix is all-zero.
    pub fn topic_share(&self, topic: usize) -> Result<f64> {
        self.check_topic(topic)?;
        let sums = self.doc_topic.column_sums();
        let total: f64 = sums.iter().sum();
        if total <= 0.0 {
            return Ok(0.0);
        }
        Ok(sums[topic] / total)
    }

    /// Topics ranked by descending share
    pub fn topics_by_share(&self) -> Vec<(usize, f32)> {
        let sums = self.doc_topic.column_sums();
        let total: f64 = sums.iter().sum();
        let mut ranked: Vec<(usize, f32)> = sums
            .iter()
            .enumerate()
            .map(|(t, &s)| (t, if total > 0.0 { (s / total) as f32 } else { 0.0 }))
            .collect();
        rank_desc(&mut ranked);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::RawDocument;
    use crate::model::backend::Algorithm;
    use crate::vectorizer::VectorizerParams;

    fn corpus() -> Arc<Corpus> {
        let docs = vec![
            RawDocument::new("a b").with_field("year", "1900"),
            RawDocument::new("b c").with_field("year", "1900"),
            RawDocument::new("c d").with_field("year", "1901"),
        ];
        Arc::new(Corpus::fit(docs, VectorizerParams::default()).unwrap())
    }

    fn fixed_model(doc_topic: Vec<Vec<f32>>, topic_word: Vec<Vec<f32>>) -> TopicModel {
        TopicModel::from_parts(
            corpus(),
            Backend::new(Algorithm::Nmf, 10, 0),
            DenseMatrix::from_rows(doc_topic).unwrap(),
            DenseMatrix::from_rows(topic_word).unwrap(),
        )
        .unwrap()
    }

    fn two_topic_model() -> TopicModel {
        fixed_model(
            vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.0, 0.0]],
            vec![vec![0.5, 0.5, 0.0, 0.1], vec![0.0, 0.2, 0.7, 0.2]],
        )
    }

    #[test]
    fn most_likely_topic_and_frequency() {
        let model = two_topic_model();
        assert_eq!(model.most_likely_topic_for_document(0).unwrap(), 0);
        assert_eq!(model.most_likely_topic_for_document(1).unwrap(), 1);
        // the all-zero row ties, lowest id wins
        assert_eq!(model.most_likely_topic_for_document(2).unwrap(), 0);
        assert!((model.topic_frequency(1, Some(1900)).unwrap() - 0.5).abs() < 1e-12);
        assert!((model.topic_frequency(0, Some(1900)).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_year_subset_has_zero_frequency() {
        let model = two_topic_model();
        assert_eq!(model.topic_frequency(0, Some(1500)).unwrap(), 0.0);
        assert_eq!(model.topics_frequency(Some(1500)), vec![0.0, 0.0]);
    }

    #[test]
    fn top_words_skip_zero_weights_and_break_ties_by_id() {
        let model = two_topic_model();
        let top = model.top_word_ids(0, 10).unwrap();
        assert_eq!(top, vec![(0, 0.5), (1, 0.5), (3, 0.1)]);
        let named = model.top_words(1, 2).unwrap();
        assert_eq!(named[0].0, "c");
        assert_eq!(named.len(), 2);
    }

    #[test]
    fn top_documents_positive_only_without_limit() {
        let model = two_topic_model();
        assert_eq!(model.top_documents(0, None).unwrap(), vec![(0, 0.9), (1, 0.2)]);
        assert_eq!(model.top_documents(0, Some(3)).unwrap().len(), 3);
    }

    #[test]
    fn distributions_are_normalized_with_zero_fallback() {
        let model = two_topic_model();
        let d = model.topic_distribution_for_document(1).unwrap();
        assert!((d.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(model.topic_distribution_for_document(2).unwrap(), vec![0.0, 0.0]);
        let w = model.topic_distribution_for_word(2).unwrap();
        assert_eq!(w, vec![0.0, 1.0]);
    }

    #[test]
    fn out_of_range_ids_are_missing() {
        let model = two_topic_model();
        assert!(matches!(
            model.top_words(2, 5),
            Err(Error::MissingEntity { kind: EntityKind::Topic, id: 2 })
        ));
        assert!(model.topic_distribution_for_document(3).is_err());
        assert!(model.topic_distribution_for_word(4).is_err());
    }

    #[test]
    fn documents_grouped_by_dominant_topic() {
        let model = two_topic_model();
        assert_eq!(model.documents_for_topic(0).unwrap(), vec![0, 2]);
        assert_eq!(model.documents_per_topic(), vec![vec![0, 2], vec![1]]);
        let share = model.topic_share(0).unwrap();
        assert!((share - 1.1 / 2.0).abs() < 1e-6);
    }

    #[test]
    fn topic_count_is_validated() {
        let backend = Backend::new(Algorithm::Nmf, 5, 0);
        assert!(TopicModel::infer_topics(corpus(), backend.clone(), 0).is_err());
        assert!(TopicModel::infer_topics(corpus(), backend.clone(), 4).is_err());
        let model = TopicModel::infer_topics(corpus(), backend, 2).unwrap();
        assert_eq!(model.doc_topic().rows(), 3);
        assert_eq!(model.topic_word().cols(), 4);
    }

    #[test]
    fn infer_and_replace_keeps_topics() {
        let mut model = TopicModel::infer_topics(corpus(), Backend::new(Algorithm::Lda, 5, 1), 2).unwrap();
        let topics = model.topic_word().clone();
        let other = Arc::new(Corpus::with_vectorizer(
            Arc::clone(model.corpus().vectorizer()),
            vec![RawDocument::new("d d"), RawDocument::new("a"), RawDocument::new("b c"), RawDocument::new("q")],
        ));
        model.infer_and_replace(other).unwrap();
        assert_eq!(model.topic_word(), &topics);
        assert_eq!(model.doc_topic().rows(), 4);
        assert_eq!(model.corpus().size(), 4);
    }
}
