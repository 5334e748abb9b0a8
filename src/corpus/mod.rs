//! Vectorized document collection.
//!
//! A `Corpus` owns the sparse document-term rows, the per-document metadata
//! and a shared reference to the fitted `Vectorizer`. Once built it is only
//! read.

pub mod source;

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EntityKind, Error, Result};
use crate::utils::math::vector::ZeroSpVec;
use crate::vectorizer::{Vectorizer, VectorizerParams};

/// Metadata field holding the publication year
pub const YEAR_FIELD: &str = "year";

/// One input document before vectorization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub text: String,
    pub metadata: IndexMap<String, String>,
}

impl RawDocument {
    pub fn new(text: impl Into<String>) -> Self {
        RawDocument {
            text: text.into(),
            metadata: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(field.into(), value.into());
        self
    }
}

/// Metadata of a vectorized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: IndexMap<String, String>,
    /// `year` metadata parsed as an integer
    pub year: Option<i32>,
}

impl Document {
    fn from_metadata(metadata: IndexMap<String, String>) -> Self {
        let year = metadata
            .get(YEAR_FIELD)
            .and_then(|y| y.trim().parse::<i32>().ok());
        Document { metadata, year }
    }
}

#[derive(Debug, Clone)]
pub struct Corpus {
    vectorizer: Arc<Vectorizer>,
    documents: Vec<Document>,
    rows: Vec<ZeroSpVec<f32>>,
    /// per word: `(doc_id, weight)` for every document containing it
    postings: Vec<Vec<(u32, f32)>>,
}

impl Corpus {
    /// Fit a new vectorizer on `docs` and vectorize them
    pub fn fit(docs: Vec<RawDocument>, params: VectorizerParams) -> Result<Corpus> {
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        let (vectorizer, rows) = Vectorizer::fit_transform(params, &texts)?;
        Ok(Corpus::assemble(Arc::new(vectorizer), docs, rows))
    }

    /// Vectorize `docs` with an already fitted vectorizer.
    /// Word ids match every other corpus sharing `vectorizer`.
    pub fn with_vectorizer(vectorizer: Arc<Vectorizer>, docs: Vec<RawDocument>) -> Corpus {
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        let rows = vectorizer.transform(&texts);
        Corpus::assemble(vectorizer, docs, rows)
    }

    fn assemble(vectorizer: Arc<Vectorizer>, docs: Vec<RawDocument>, rows: Vec<ZeroSpVec<f32>>) -> Corpus {
        let mut postings: Vec<Vec<(u32, f32)>> = vec![Vec::new(); vectorizer.vocabulary_size()];
        for (doc_id, row) in rows.iter().enumerate() {
            for (word_id, weight) in row.raw_iter() {
                postings[word_id].push((doc_id as u32, weight));
            }
        }
        let documents: Vec<Document> = docs
            .into_iter()
            .map(|d| Document::from_metadata(d.metadata))
            .collect();
        info!(
            target: "topic_explorer::corpus",
            documents = documents.len(),
            vocabulary = vectorizer.vocabulary_size(),
            "Corpus assembled"
        );
        Corpus {
            vectorizer,
            documents,
            rows,
            postings,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn vocabulary_size(&self) -> usize {
        self.vectorizer.vocabulary_size()
    }

    #[inline]
    pub fn vectorizer(&self) -> &Arc<Vectorizer> {
        &self.vectorizer
    }

    /// Sparse rows indexed by document id
    #[inline]
    pub fn rows(&self) -> &[ZeroSpVec<f32>] {
        &self.rows
    }

    pub fn vector_for_document(&self, doc_id: usize) -> Result<&ZeroSpVec<f32>> {
        self.rows
            .get(doc_id)
            .ok_or_else(|| Error::missing(EntityKind::Document, doc_id))
    }

    pub fn document(&self, doc_id: usize) -> Result<&Document> {
        self.documents
            .get(doc_id)
            .ok_or_else(|| Error::missing(EntityKind::Document, doc_id))
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn year(&self, doc_id: usize) -> Option<i32> {
        self.documents.get(doc_id).and_then(|d| d.year)
    }

    /// Ids of the documents containing `word_id` with a positive weight
    pub fn docs_for_word(&self, word_id: usize) -> Result<Vec<usize>> {
        Ok(self
            .postings(word_id)?
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(doc, _)| *doc as usize)
            .collect())
    }

    /// `(doc_id, weight)` of every document containing `word_id`, by doc id
    pub fn postings(&self, word_id: usize) -> Result<&[(u32, f32)]> {
        self.postings
            .get(word_id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::missing(EntityKind::Word, word_id))
    }

    /// Number of documents of this corpus containing `word_id`
    pub fn doc_frequency(&self, word_id: usize) -> Result<usize> {
        Ok(self.postings(word_id)?.len())
    }

    pub fn id_for_word(&self, word: &str) -> Option<usize> {
        self.vectorizer.id_for_term(word)
    }

    pub fn word_for_id(&self, word_id: usize) -> Result<&str> {
        self.vectorizer
            .term_for_id(word_id)
            .ok_or_else(|| Error::missing(EntityKind::Word, word_id))
    }

    /// Ids of the documents published in `year`
    pub fn doc_ids(&self, year: i32) -> Vec<usize> {
        self.documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.year == Some(year))
            .map(|(id, _)| id)
            .collect()
    }

    /// Sorted union of metadata field names across documents
    pub fn field_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .documents
            .iter()
            .flat_map(|d| d.metadata.keys().map(String::as_str))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// `(min, max)` of the parsed years, `None` when no document has one
    pub fn year_range(&self) -> Option<(i32, i32)> {
        let mut years = self.documents.iter().filter_map(|d| d.year);
        let first = years.next()?;
        Some(years.fold((first, first), |(lo, hi), y| (lo.min(y), hi.max(y))))
    }

    /// True when every row is all-zero
    pub fn is_degenerate(&self) -> bool {
        self.rows.iter().all(ZeroSpVec::is_all_zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorizer::Weighting;

    fn tf_params() -> VectorizerParams {
        VectorizerParams {
            weighting: Weighting::Tf,
            ..VectorizerParams::default()
        }
    }

    #[test]
    fn docs_for_word_lists_positive_weights() {
        let docs = vec![
            RawDocument::new("a a b"),
            RawDocument::new("a b"),
            RawDocument::new("b"),
        ];
        let corpus = Corpus::fit(docs, tf_params()).unwrap();
        let a = corpus.id_for_word("a").unwrap();
        assert_eq!(corpus.vector_for_document(0).unwrap().get(a), Some(2.0));
        assert_eq!(corpus.docs_for_word(a).unwrap(), vec![0, 1]);
        assert_eq!(corpus.doc_frequency(a).unwrap(), 2);
    }

    #[test]
    fn out_of_range_ids_are_missing_entities() {
        let corpus = Corpus::fit(vec![RawDocument::new("a")], tf_params()).unwrap();
        assert!(matches!(
            corpus.vector_for_document(3),
            Err(Error::MissingEntity { kind: EntityKind::Document, id: 3 })
        ));
        assert!(corpus.word_for_id(1).is_err());
        assert!(corpus.docs_for_word(9).is_err());
    }

    #[test]
    fn years_and_fields() {
        let docs = vec![
            RawDocument::new("a").with_field("year", "1763").with_field("title", "One"),
            RawDocument::new("a").with_field("author", "X").with_field("year", "unknown"),
            RawDocument::new("a").with_field("year", "1801"),
        ];
        let corpus = Corpus::fit(docs, tf_params()).unwrap();
        assert_eq!(corpus.field_names(), vec!["author", "title", "year"]);
        assert_eq!(corpus.year(1), None);
        assert_eq!(corpus.year_range(), Some((1763, 1801)));
        assert_eq!(corpus.doc_ids(1801), vec![2]);
    }

    #[test]
    fn shared_vectorizer_keeps_word_ids() {
        let train = Corpus::fit(vec![RawDocument::new("x y"), RawDocument::new("y z")], tf_params()).unwrap();
        let other = Corpus::with_vectorizer(
            Arc::clone(train.vectorizer()),
            vec![RawDocument::new("z q")],
        );
        assert_eq!(other.vocabulary_size(), 3);
        assert_eq!(other.id_for_word("z"), train.id_for_word("z"));
        assert_eq!(other.docs_for_word(2).unwrap(), vec![0]);
    }
}
