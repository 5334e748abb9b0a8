//! End-to-end batch run: load, vectorize, fit, index, aggregate.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregationContext, AggregationParams, AggregationReport, Aggregator};
use crate::config::Config;
use crate::corpus::source::load_collection;
use crate::corpus::Corpus;
use crate::error::Result;
use crate::model::artifact::ModelArtifact;
use crate::model::TopicModel;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub documents: usize,
    pub vocabulary: usize,
    pub nb_topics: usize,
    pub topics: usize,
    pub docs: usize,
    pub words: usize,
}

impl RunReport {
    fn new(model: &TopicModel, stored: AggregationReport) -> Self {
        RunReport {
            documents: model.corpus().size(),
            vocabulary: model.corpus().vocabulary_size(),
            nb_topics: model.nb_topics(),
            topics: stored.topics,
            docs: stored.docs,
            words: stored.words,
        }
    }
}

pub fn aggregation_params(config: &Config) -> Result<AggregationParams> {
    Ok(AggregationParams {
        top_words: config.aggregation.top_words,
        nb_similar_docs: config.similarity.nb_similar_docs,
        nb_similar_words: config.similarity.nb_similar_words,
        interval: config.interval(),
        start_year: config.topics_over_time.start_year,
        end_year: config.topics_over_time.end_year,
        workers: config.aggregation.workers,
        index: config.index_params()?,
    })
}

/// Fit the topic model described by `config`. With an inference
/// collection the document weights are recomputed for it afterwards.
pub fn build_model(config: &Config) -> Result<TopicModel> {
    let docs = load_collection(&config.source.path, config.source.min_tokens_per_doc)?;
    let corpus = Arc::new(Corpus::fit(docs, config.vectorizer_params()?)?);
    let mut model = TopicModel::infer_topics(corpus, config.backend()?, config.topic_modeling.nb_topics)?;

    if let Some(path) = &config.aggregation.artifact_path {
        ModelArtifact::from_model(&model).save(path)?;
    }

    if let Some(path) = &config.source.inference_path {
        let docs = load_collection(path, config.source.min_tokens_per_doc)?;
        let vectorizer = Arc::clone(model.corpus().vectorizer());
        model.infer_and_replace(Arc::new(Corpus::with_vectorizer(vectorizer, docs)))?;
    }
    Ok(model)
}

/// Run every stage and replace the stored tables of `config.database`
pub fn run(config: &Config) -> Result<RunReport> {
    let started = Instant::now();
    info!(
        target: "topic_explorer::pipeline",
        source = %config.source.path.display(),
        database = %config.database.path.display(),
        table = %config.database.table_name,
        "Pipeline started"
    );
    let model = Arc::new(build_model(config)?);
    let params = aggregation_params(config)?;
    let aggregator = Aggregator::new(params.workers)?;
    let ctx = AggregationContext::new(Arc::clone(&model), params)?;

    let mut store = Store::open(&config.database.path)?;
    let stored = aggregator.run(&ctx, &mut store, &config.database.table_name)?;
    let report = RunReport::new(&model, stored);
    info!(
        target: "topic_explorer::pipeline",
        documents = report.documents,
        vocabulary = report.vocabulary,
        nb_topics = report.nb_topics,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Pipeline finished"
    );
    Ok(report)
}
