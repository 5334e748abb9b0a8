pub mod serde;
pub mod term;
pub mod tfidf;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use ::serde::{Deserialize, Serialize};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::math::vector::ZeroSpVec;
use crate::vectorizer::term::TermFrequency;
use crate::vectorizer::tfidf::{TfEngine, TfIdfEngine, WeightingEngine};

/// Weighting scheme applied to count rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    Tf,
    TfIdf,
}

impl FromStr for Weighting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tf" => Ok(Weighting::Tf),
            "tfidf" | "tf-idf" => Ok(Weighting::TfIdf),
            other => Err(Error::configuration(format!(
                "unknown vectorization scheme '{other}', expected \"tf\" or \"tfidf\""
            ))),
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weighting::Tf => write!(f, "tf"),
            Weighting::TfIdf => write!(f, "tfidf"),
        }
    }
}

/// Document-frequency threshold.
/// An integer counts documents, a float is a share of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocFrequency {
    Absolute(usize),
    Relative(f64),
}

impl DocFrequency {
    fn validate(self, name: &str) -> Result<()> {
        match self {
            DocFrequency::Relative(r) if !(0.0..=1.0).contains(&r) => Err(Error::configuration(
                format!("{name} as a proportion must lie in [0, 1], got {r}"),
            )),
            _ => Ok(()),
        }
    }

    /// Smallest document count satisfying `df >= self`
    fn lower_count(self, doc_num: usize) -> usize {
        match self {
            DocFrequency::Absolute(n) => n,
            DocFrequency::Relative(r) => (r * doc_num as f64).ceil() as usize,
        }
    }

    /// Largest document count satisfying `df <= self`
    fn upper_count(self, doc_num: usize) -> usize {
        match self {
            DocFrequency::Absolute(n) => n,
            DocFrequency::Relative(r) => (r * doc_num as f64).floor() as usize,
        }
    }
}

/// Vectorizer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerParams {
    pub weighting: Weighting,
    /// keep only the terms with the highest total count
    pub max_features: Option<usize>,
    pub min_df: DocFrequency,
    pub max_df: DocFrequency,
    /// inclusive `(min_n, max_n)`
    pub ngram_range: (usize, usize),
}

impl Default for VectorizerParams {
    fn default() -> Self {
        VectorizerParams {
            weighting: Weighting::TfIdf,
            max_features: None,
            min_df: DocFrequency::Absolute(1),
            max_df: DocFrequency::Relative(1.0),
            ngram_range: (1, 1),
        }
    }
}

impl VectorizerParams {
    pub fn validate(&self) -> Result<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(Error::configuration(format!(
                "invalid n-gram range ({min_n}, {max_n})"
            )));
        }
        if self.max_features == Some(0) {
            return Err(Error::configuration("max_features must be positive"));
        }
        self.min_df.validate("min_df")?;
        self.max_df.validate("max_df")?;
        Ok(())
    }
}

/// Vectorizer
/// Learns a vocabulary from raw texts and turns texts into sparse weighted rows.
///
/// Vocabulary ids follow ascending surface form, so re-fitting the same
/// texts always gives the same ids. A fitted vectorizer applied to another
/// document set keeps the vocabulary and idf of the fit pass.
///
/// # Serialization
/// Supported through `VectorizerData`.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    params: VectorizerParams,
    /// surface form by id
    vocabulary: Vec<String>,
    /// id by surface form
    term_index: HashMap<String, u32>,
    idf: Vec<f32>,
    /// document count of the fit pass
    doc_num: usize,
}

impl Vectorizer {
    /// Learn the vocabulary of `texts` and return their weighted rows.
    ///
    /// # Errors
    /// * `Configuration` for invalid parameters or when the resolved
    ///   `max_df` count is lower than the `min_df` count
    /// * `EmptyVocabulary` when the frequency filters leave no term
    pub fn fit_transform<T>(params: VectorizerParams, texts: &[T]) -> Result<(Vectorizer, Vec<ZeroSpVec<f32>>)>
    where
        T: AsRef<str> + Sync,
    {
        params.validate()?;
        let doc_num = texts.len();
        info!(
            target: "topic_explorer::vectorizer",
            documents = doc_num,
            weighting = %params.weighting,
            "Fitting vectorizer"
        );

        let freqs = count_terms(texts, params.ngram_range);

        // (document frequency, total count) per term, ordered by surface form
        let mut stats: BTreeMap<&str, (u32, u64)> = BTreeMap::new();
        for freq in &freqs {
            for (term, count) in freq.iter() {
                let entry = stats.entry(term).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += count as u64;
            }
        }

        let min_count = params.min_df.lower_count(doc_num);
        let max_count = params.max_df.upper_count(doc_num);
        if max_count < min_count {
            return Err(Error::configuration(format!(
                "max_df corresponds to {max_count} documents, fewer than the {min_count} of min_df"
            )));
        }

        let mut kept: Vec<(&str, u32, u64)> = stats
            .into_iter()
            .filter(|(_, (df, _))| (min_count..=max_count).contains(&(*df as usize)))
            .map(|(term, (df, total))| (term, df, total))
            .collect();

        if let Some(max_features) = params.max_features {
            if kept.len() > max_features {
                kept.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));
                kept.truncate(max_features);
                kept.sort_by(|a, b| a.0.cmp(b.0));
            }
        }

        if kept.is_empty() {
            return Err(Error::EmptyVocabulary {
                documents: doc_num,
                min_df: min_count,
                max_df: max_count,
            });
        }

        let doc_freq: Vec<u32> = kept.iter().map(|(_, df, _)| *df).collect();
        let vocabulary: Vec<String> = kept.iter().map(|(term, _, _)| term.to_string()).collect();
        let idf = match params.weighting {
            Weighting::Tf => TfEngine::idf_vec(&doc_freq, doc_num),
            Weighting::TfIdf => TfIdfEngine::idf_vec(&doc_freq, doc_num),
        };

        let vectorizer = Vectorizer::from_parts(params, vocabulary, idf, doc_num);
        let rows = vectorizer.rows_from_freqs(&freqs);
        debug!(
            target: "topic_explorer::vectorizer",
            vocabulary = vectorizer.vocabulary_size(),
            "Vocabulary fitted"
        );
        Ok((vectorizer, rows))
    }

    pub(crate) fn from_parts(
        params: VectorizerParams,
        vocabulary: Vec<String>,
        idf: Vec<f32>,
        doc_num: usize,
    ) -> Self {
        let term_index = vocabulary
            .iter()
            .enumerate()
            .map(|(id, term)| (term.clone(), id as u32))
            .collect();
        Vectorizer {
            params,
            vocabulary,
            term_index,
            idf,
            doc_num,
        }
    }

    /// Weighted rows of `texts` against the fitted vocabulary.
    /// Out-of-vocabulary n-grams are ignored.
    pub fn transform<T>(&self, texts: &[T]) -> Vec<ZeroSpVec<f32>>
    where
        T: AsRef<str> + Sync,
    {
        debug!(
            target: "topic_explorer::vectorizer",
            documents = texts.len(),
            "Transforming with fitted vocabulary"
        );
        let freqs = count_terms(texts, self.params.ngram_range);
        self.rows_from_freqs(&freqs)
    }

    fn rows_from_freqs(&self, freqs: &[TermFrequency]) -> Vec<ZeroSpVec<f32>> {
        let dim = self.vocabulary.len();
        freqs
            .par_iter()
            .map(|freq| {
                let mut inds = Vec::with_capacity(freq.term_num());
                let mut vals = Vec::with_capacity(freq.term_num());
                for (term, count) in freq.iter() {
                    if let Some(&id) = self.term_index.get(term) {
                        inds.push(id);
                        vals.push(count);
                    }
                }
                let counts = ZeroSpVec::from_unsorted(dim, inds, vals);
                match self.params.weighting {
                    Weighting::Tf => TfEngine::weigh(&counts, &self.idf),
                    Weighting::TfIdf => TfIdfEngine::weigh(&counts, &self.idf),
                }
            })
            .collect()
    }

    #[inline]
    pub fn params(&self) -> &VectorizerParams {
        &self.params
    }

    #[inline]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Surface forms ordered by id
    #[inline]
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    #[inline]
    pub fn id_for_term(&self, term: &str) -> Option<usize> {
        self.term_index.get(term).map(|&id| id as usize)
    }

    #[inline]
    pub fn term_for_id(&self, id: usize) -> Option<&str> {
        self.vocabulary.get(id).map(String::as_str)
    }

    #[inline]
    pub fn idf(&self) -> &[f32] {
        &self.idf
    }

    /// Document count of the fit pass
    #[inline]
    pub fn doc_num(&self) -> usize {
        self.doc_num
    }
}

fn count_terms<T>(texts: &[T], ngram_range: (usize, usize)) -> Vec<TermFrequency>
where
    T: AsRef<str> + Sync,
{
    texts
        .par_iter()
        .map(|text| TermFrequency::from_text(text.as_ref(), ngram_range))
        .collect()
}
