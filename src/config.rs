//! Pipeline configuration, read from a TOML file.
//!
//! ```toml
//! [source]
//! path = "corpora/elysee"
//! min_tokens_per_doc = 5
//!
//! [database]
//! path = "data/topics.db"
//! table_name = "elysee"
//!
//! [vectorization]
//! scheme = "tfidf"        # or "tf"
//! min_df = 2              # integer: documents, float: share of the corpus
//! max_df = 0.8
//!
//! [topic_modeling]
//! algorithm = "nmf"       # or "lda"
//! nb_topics = 15
//!
//! [topics_over_time]
//! interval = 10           # 1, 10, 25, 50 or 100
//! ```
//!
//! Every section but `[source]` and `[database]` may be omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{IndexParams, IndexStrategy};
use crate::model::backend::{Algorithm, Backend};
use crate::storage::schema::is_identifier;
use crate::utils::time::TimeInterval;
use crate::vectorizer::{DocFrequency, VectorizerParams, Weighting};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vectorization: VectorizationConfig,
    #[serde(default)]
    pub topic_modeling: TopicModelingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub topics_over_time: TopicsOverTimeConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// collection directory holding `texts/` and `metadata.json`
    pub path: PathBuf,
    /// documents to project onto the fitted topics instead of the training set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_path: Option<PathBuf>,
    #[serde(default)]
    pub min_tokens_per_doc: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// prefix of the `<table>_topics`, `<table>_docs` and `<table>_words` tables
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

fn default_table_name() -> String {
    "corpus".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizationConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_features: Option<usize>,
    #[serde(default = "default_min_df")]
    pub min_df: DocFrequency,
    #[serde(default = "default_max_df")]
    pub max_df: DocFrequency,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
}

fn default_scheme() -> String {
    "tfidf".to_string()
}

fn default_min_df() -> DocFrequency {
    DocFrequency::Absolute(1)
}

fn default_max_df() -> DocFrequency {
    DocFrequency::Relative(1.0)
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

impl Default for VectorizationConfig {
    fn default() -> Self {
        VectorizationConfig {
            scheme: default_scheme(),
            max_features: None,
            min_df: default_min_df(),
            max_df: default_max_df(),
            ngram_range: default_ngram_range(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicModelingConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_nb_topics")]
    pub nb_topics: usize,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default)]
    pub seed: u64,
}

fn default_algorithm() -> String {
    "nmf".to_string()
}

fn default_nb_topics() -> usize {
    10
}

fn default_max_iter() -> usize {
    200
}

impl Default for TopicModelingConfig {
    fn default() -> Self {
        TopicModelingConfig {
            algorithm: default_algorithm(),
            nb_topics: default_nb_topics(),
            max_iter: default_max_iter(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// "exact", "forest" or "auto"
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: usize,
    #[serde(default = "default_nb_trees")]
    pub nb_trees: usize,
    #[serde(default = "default_leaf_size")]
    pub leaf_size: usize,
    #[serde(default = "default_index_seed")]
    pub seed: u64,
    #[serde(default = "default_nb_similar_docs")]
    pub nb_similar_docs: usize,
    #[serde(default = "default_nb_similar_words")]
    pub nb_similar_words: usize,
}

fn default_strategy() -> String {
    "auto".to_string()
}

fn default_exact_threshold() -> usize {
    IndexParams::default().exact_threshold
}

fn default_nb_trees() -> usize {
    IndexParams::default().nb_trees
}

fn default_leaf_size() -> usize {
    IndexParams::default().leaf_size
}

fn default_index_seed() -> u64 {
    IndexParams::default().seed
}

fn default_nb_similar_docs() -> usize {
    20
}

fn default_nb_similar_words() -> usize {
    100
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            strategy: default_strategy(),
            exact_threshold: default_exact_threshold(),
            nb_trees: default_nb_trees(),
            leaf_size: default_leaf_size(),
            seed: default_index_seed(),
            nb_similar_docs: default_nb_similar_docs(),
            nb_similar_words: default_nb_similar_words(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicsOverTimeConfig {
    #[serde(default)]
    pub interval: TimeInterval,
    /// defaults to the earliest year of the corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    /// defaults to the latest year of the corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// worker threads; available cores minus one when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default = "default_top_words")]
    pub top_words: usize,
    /// CBOR snapshot of the fitted model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

fn default_top_words() -> usize {
    50
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            workers: None,
            top_words: default_top_words(),
            artifact_path: None,
        }
    }
}

impl Config {
    /// Read, parse and validate a config file.
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Configuration` when it does not
    /// parse or a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Config::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        debug!(target: "topic_explorer::config", path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Check every value eagerly so a bad file fails before any work starts.
    pub fn validate(&self) -> Result<()> {
        self.vectorizer_params()?.validate()?;
        self.backend()?;
        self.index_params()?;
        if self.topic_modeling.nb_topics == 0 {
            return Err(Error::configuration("nb_topics must be positive"));
        }
        if !is_identifier(&self.database.table_name) {
            return Err(Error::configuration(format!(
                "table name '{}' is not a valid identifier",
                self.database.table_name
            )));
        }
        if let (Some(start), Some(end)) = (self.topics_over_time.start_year, self.topics_over_time.end_year) {
            if start > end {
                return Err(Error::configuration(format!(
                    "start_year {start} is after end_year {end}"
                )));
            }
        }
        if self.aggregation.workers == Some(0) {
            return Err(Error::configuration("workers must be positive"));
        }
        Ok(())
    }

    pub fn weighting(&self) -> Result<Weighting> {
        self.vectorization.scheme.parse()
    }

    pub fn vectorizer_params(&self) -> Result<VectorizerParams> {
        let v = &self.vectorization;
        Ok(VectorizerParams {
            weighting: self.weighting()?,
            max_features: v.max_features,
            min_df: v.min_df,
            max_df: v.max_df,
            ngram_range: v.ngram_range,
        })
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        self.topic_modeling.algorithm.parse()
    }

    pub fn backend(&self) -> Result<Backend> {
        let t = &self.topic_modeling;
        Ok(Backend::new(self.algorithm()?, t.max_iter, t.seed))
    }

    pub fn index_params(&self) -> Result<IndexParams> {
        let s = &self.similarity;
        let strategy: IndexStrategy = s.strategy.parse()?;
        Ok(IndexParams {
            strategy,
            exact_threshold: s.exact_threshold,
            nb_trees: s.nb_trees,
            leaf_size: s.leaf_size,
            seed: s.seed,
        })
    }

    pub fn interval(&self) -> TimeInterval {
        self.topics_over_time.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[source]
path = "corpus"

[database]
path = "out.db"
"#;

    #[test]
    fn minimal_file_takes_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.database.table_name, "corpus");
        assert_eq!(config.topic_modeling.nb_topics, 10);
        assert_eq!(config.interval().years(), 1);
        assert_eq!(config.aggregation.top_words, 50);
        assert_eq!(config.similarity.nb_similar_docs, 20);
        assert_eq!(config.similarity.nb_similar_words, 100);
        assert_eq!(config.weighting().unwrap(), Weighting::TfIdf);
        assert_eq!(config.algorithm().unwrap(), Algorithm::Nmf);
    }

    #[test]
    fn df_thresholds_accept_counts_and_shares() {
        let toml = format!("{MINIMAL}\n[vectorization]\nmin_df = 2\nmax_df = 0.5\nngram_range = [1, 2]\n");
        let params = Config::from_toml_str(&toml).unwrap().vectorizer_params().unwrap();
        assert_eq!(params.min_df, DocFrequency::Absolute(2));
        assert_eq!(params.max_df, DocFrequency::Relative(0.5));
        assert_eq!(params.ngram_range, (1, 2));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let toml = format!("{MINIMAL}\n[vectorization]\nscheme = \"bm25\"\n");
        assert!(matches!(Config::from_toml_str(&toml), Err(Error::Configuration(_))));
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let toml = format!("{MINIMAL}\n[topics_over_time]\ninterval = 7\n");
        assert!(matches!(Config::from_toml_str(&toml), Err(Error::Configuration(_))));
    }

    #[test]
    fn unsafe_table_name_is_rejected() {
        let toml = MINIMAL.replace("path = \"out.db\"", "path = \"out.db\"\ntable_name = \"x; drop\"");
        assert!(matches!(Config::from_toml_str(&toml), Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_topics_is_rejected() {
        let toml = format!("{MINIMAL}\n[topic_modeling]\nnb_topics = 0\n");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn from_file_round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        let toml = format!("{MINIMAL}\n[topic_modeling]\nalgorithm = \"lda\"\nnb_topics = 4\n");
        std::fs::write(&path, toml).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.algorithm().unwrap(), Algorithm::Lda);

        let rewritten = Config::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(rewritten.topic_modeling.nb_topics, 4);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
