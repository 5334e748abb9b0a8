//! Per-topic, per-document and per-word aggregates.
//!
//! Each family is one stage. A stage computes its records on a dedicated
//! worker pool, every worker reading the shared `AggregationContext`, and
//! streams finished rows over a channel to the calling thread, which alone
//! writes them into the run's table generation.

pub mod docs;
pub mod topics;
pub mod words;

use std::fs;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::corpus::Corpus;
use crate::error::{EntityKind, Error, Result};
use crate::index::{build_index, DenseSpace, IndexParams, SimilarityIndex, SparseSpace};
use crate::model::TopicModel;
use crate::storage::schema::{check_metadata_fields, Row, RunInfo, TableSchema, TopicSummary, TOPIC_WORDS_FILE};
use crate::storage::{Generation, Store};
use crate::utils::math::vector::ZeroSpVec;
use crate::utils::time::{TimeInterval, Timeline};

/// rows buffered between the workers and the writer
const CHANNEL_BOUND: usize = 1024;

#[derive(Debug, Clone)]
pub struct AggregationParams {
    /// words per topic distribution
    pub top_words: usize,
    /// neighbors per document and per index
    pub nb_similar_docs: usize,
    /// neighbors per word and per method
    pub nb_similar_words: usize,
    pub interval: TimeInterval,
    /// defaults to the earliest year of the corpus
    pub start_year: Option<i32>,
    /// defaults to the latest year of the corpus
    pub end_year: Option<i32>,
    pub workers: Option<usize>,
    pub index: IndexParams,
}

impl Default for AggregationParams {
    fn default() -> Self {
        AggregationParams {
            top_words: 50,
            nb_similar_docs: 20,
            nb_similar_words: 100,
            interval: TimeInterval::default(),
            start_year: None,
            end_year: None,
            workers: None,
            index: IndexParams::default(),
        }
    }
}

/// Configured worker count, or available cores minus one (at least 1)
pub fn worker_count(configured: Option<usize>) -> usize {
    configured.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
    })
    .max(1)
}

/// Read-only state shared by every aggregation task
pub struct AggregationContext {
    model: Arc<TopicModel>,
    params: AggregationParams,
    timeline: Timeline,
    /// `(start, end)` years covered by the timeline
    year_range: Option<(i32, i32)>,
    docs_per_bucket: Vec<usize>,
    metadata_fields: Vec<String>,
    doc_topic_index: Box<dyn SimilarityIndex>,
    doc_vector_index: Box<dyn SimilarityIndex>,
    word_topic_index: Box<dyn SimilarityIndex>,
    word_cooc_index: Box<dyn SimilarityIndex>,
}

impl AggregationContext {
    /// Resolve the timeline and build the four similarity indices.
    ///
    /// # Errors
    /// `Configuration` when a metadata field cannot be a column,
    /// `DegenerateCorpus` when a similarity space has no non-zero vector.
    pub fn new(model: Arc<TopicModel>, params: AggregationParams) -> Result<Self> {
        let started = Instant::now();
        let corpus = Arc::clone(model.corpus());
        let metadata_fields = corpus.field_names();
        check_metadata_fields(&metadata_fields)?;
        let year_range = match (params.start_year, params.end_year, corpus.year_range()) {
            (Some(start), Some(end), _) => Some((start, end)),
            (start, end, Some((lo, hi))) => Some((start.unwrap_or(lo), end.unwrap_or(hi))),
            (_, _, None) => None,
        };
        let timeline = match year_range {
            Some((start, end)) => Timeline::new(start, end, params.interval),
            None => Timeline::empty(params.interval),
        };
        let mut docs_per_bucket = vec![0usize; timeline.len()];
        for doc in 0..corpus.size() {
            if let Some(bucket) = bucket_for(&timeline, year_range, corpus.year(doc)) {
                docs_per_bucket[bucket] += 1;
            }
        }

        let index = &params.index;
        let doc_topic_index = build_index(DenseSpace::new(model.doc_topic().clone()), EntityKind::Document, index)?;
        let doc_vector_index = build_index(SparseSpace::new(corpus.rows().to_vec()), EntityKind::Document, index)?;
        let word_topic_index = build_index(DenseSpace::new(model.topic_word().transpose()), EntityKind::Word, index)?;
        let word_cooc_index = build_index(SparseSpace::new(word_columns(&corpus)?), EntityKind::Word, index)?;

        info!(
            target: "topic_explorer::aggregate",
            buckets = timeline.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation context ready"
        );
        Ok(AggregationContext {
            metadata_fields,
            model,
            params,
            timeline,
            year_range,
            docs_per_bucket,
            doc_topic_index,
            doc_vector_index,
            word_topic_index,
            word_cooc_index,
        })
    }

    #[inline]
    pub fn model(&self) -> &TopicModel {
        &self.model
    }

    #[inline]
    pub fn corpus(&self) -> &Corpus {
        self.model.corpus()
    }

    #[inline]
    pub fn params(&self) -> &AggregationParams {
        &self.params
    }

    #[inline]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Sorted union of the documents' metadata field names
    #[inline]
    pub fn metadata_fields(&self) -> &[String] {
        &self.metadata_fields
    }

    /// Timeline bucket of `doc`, `None` without a year or outside the range
    pub fn bucket_of_doc(&self, doc: usize) -> Option<usize> {
        bucket_for(&self.timeline, self.year_range, self.corpus().year(doc))
    }

    #[inline]
    pub fn docs_in_bucket(&self, bucket: usize) -> usize {
        self.docs_per_bucket.get(bucket).copied().unwrap_or(0)
    }

    pub fn run_info(&self) -> RunInfo {
        let corpus = self.corpus();
        RunInfo {
            nb_topics: self.model.nb_topics(),
            interval: self.params.interval.years(),
            metadata_fields: self.metadata_fields.clone(),
            start_year: self.year_range.map(|(start, _)| start),
            end_year: self.year_range.map(|(_, end)| end),
            nb_docs: corpus.size(),
            vocabulary_size: corpus.vocabulary_size(),
            algorithm: self.model.backend().algorithm().to_string(),
            weighting: corpus.vectorizer().params().weighting.to_string(),
        }
    }
}

fn bucket_for(timeline: &Timeline, range: Option<(i32, i32)>, year: Option<i32>) -> Option<usize> {
    let (start, end) = range?;
    let year = year?;
    if year < start || year > end {
        return None;
    }
    timeline.bucket_of(year)
}

/// Document-occurrence vector of every word
fn word_columns(corpus: &Corpus) -> Result<Vec<ZeroSpVec<f32>>> {
    (0..corpus.vocabulary_size())
        .map(|word| {
            let postings = corpus.postings(word)?;
            let inds = postings.iter().map(|&(doc, _)| doc).collect();
            let vals = postings.iter().map(|&(_, w)| w).collect();
            Ok(ZeroSpVec::from_unsorted(corpus.size(), inds, vals))
        })
        .collect()
}

/// Row counts of the committed generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregationReport {
    pub topics: usize,
    pub docs: usize,
    pub words: usize,
}

/// Worker pool plus single writer
pub struct Aggregator {
    pool: ThreadPool,
}

impl Aggregator {
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let threads = worker_count(workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("aggregate-{i}"))
            .build()
            .map_err(|e| Error::Pipeline(format!("failed to start worker pool: {e}")))?;
        debug!(target: "topic_explorer::aggregate", threads, "Worker pool started");
        Ok(Aggregator { pool })
    }

    /// Write every table of the run under `prefix` as one generation, then
    /// `topic_words.json` next to the database.
    ///
    /// All schemas are resolved before anything is written, and the live
    /// tables are only swapped once every stage has succeeded.
    pub fn run(&self, ctx: &AggregationContext, store: &mut Store, prefix: &str) -> Result<AggregationReport> {
        let started = Instant::now();
        let info_schema = TableSchema::info(prefix);
        let topic_schema = TableSchema::topics(prefix);
        let doc_schema = TableSchema::docs(prefix, ctx.metadata_fields())?;
        let word_schema = TableSchema::words(prefix);
        let info_rows = ctx.run_info().into_rows()?;

        let schemas = [info_schema.clone(), topic_schema.clone(), doc_schema.clone(), word_schema.clone()];
        let mut generation = store.begin(&schemas)?;
        for row in &info_rows {
            generation.insert(&info_schema.name, row)?;
        }
        let topics = self.stage(&mut generation, &topic_schema, ctx.model().nb_topics(), |topic| {
            topics::compute_topic(ctx, topic)?.into_row()
        })?;
        let docs = self.stage(&mut generation, &doc_schema, ctx.corpus().size(), |doc| {
            docs::compute_doc(ctx, doc)?.into_row()
        })?;
        let words = self.stage(&mut generation, &word_schema, ctx.corpus().vocabulary_size(), |word| {
            words::compute_word(ctx, word)?.into_row()
        })?;
        generation.commit()?;

        let summary_path = store
            .path()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(TOPIC_WORDS_FILE);
        write_topic_summary(ctx, &summary_path)?;

        let report = AggregationReport { topics, docs, words };
        info!(
            target: "topic_explorer::aggregate",
            topics, docs, words,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation finished"
        );
        Ok(report)
    }

    /// Compute `units` rows on the pool and write them into `schema`'s
    /// shadow table of `generation`.
    ///
    /// A worker error stops the producers; a writer error closes the
    /// channel, which stops them at their next send. Either way the error
    /// is returned and the caller drops the generation.
    pub fn stage<F>(&self, generation: &mut Generation<'_>, schema: &TableSchema, units: usize, compute: F) -> Result<usize>
    where
        F: Fn(usize) -> Result<Row> + Sync,
    {
        let started = Instant::now();
        let (tx, rx) = mpsc::sync_channel::<Row>(CHANNEL_BOUND);
        let pool = &self.pool;
        let compute = &compute;

        thread::scope(|scope| {
            let producer = scope.spawn(move || {
                pool.install(|| {
                    (0..units).into_par_iter().try_for_each_with(tx, |tx, unit| {
                        let row = compute(unit)?;
                        tx.send(row)
                            .map_err(|_| Error::Pipeline("writer closed the channel".to_string()))
                    })
                })
            });

            let mut written = Ok(());
            for row in rx.iter() {
                if let Err(e) = generation.insert(&schema.name, &row) {
                    written = Err(e);
                    break;
                }
            }
            drop(rx);
            let produced = producer
                .join()
                .map_err(|_| Error::Pipeline("aggregation worker panicked".to_string()))?;
            written?;
            produced
        })?;

        let rows = generation.rows(&schema.name);
        debug!(
            target: "topic_explorer::aggregate",
            table = %schema.name,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage written"
        );
        Ok(rows)
    }
}

/// Topic summary sorted by topic id
pub fn topic_summary(ctx: &AggregationContext) -> Result<Vec<TopicSummary>> {
    let model = ctx.model();
    (0..model.nb_topics())
        .map(|topic| {
            let words: Vec<String> = model.top_words(topic, 10)?.into_iter().map(|(w, _)| w).collect();
            Ok(TopicSummary {
                name: topic,
                frequency: model.topic_share(topic)?,
                description: words.join(", "),
            })
        })
        .collect()
}

fn write_topic_summary(ctx: &AggregationContext, path: &Path) -> Result<()> {
    let summary = topic_summary(ctx)?;
    fs::write(path, serde_json::to_vec(&summary)?)?;
    debug!(target: "topic_explorer::aggregate", path = %path.display(), "Topic summary written");
    Ok(())
}
