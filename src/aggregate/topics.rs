use crate::aggregate::AggregationContext;
use crate::error::Result;
use crate::storage::schema::{Distribution, TopicRecord};

/// Mean normalized weight of `topic` over the documents of every bucket.
/// An empty bucket has value 0.0.
pub fn topic_evolution(ctx: &AggregationContext, topic: usize) -> Result<Distribution<i32>> {
    let model = ctx.model();
    let mut sums = vec![0.0f64; ctx.timeline().len()];
    for doc in 0..ctx.corpus().size() {
        if let Some(bucket) = ctx.bucket_of_doc(doc) {
            sums[bucket] += model.topic_distribution_for_document(doc)?[topic] as f64;
        }
    }
    let data = sums
        .into_iter()
        .enumerate()
        .map(|(bucket, sum)| match ctx.docs_in_bucket(bucket) {
            0 => 0.0,
            n => (sum / n as f64) as f32,
        })
        .collect();
    Ok(Distribution::new(ctx.timeline().buckets().to_vec(), data))
}

pub fn compute_topic(ctx: &AggregationContext, topic: usize) -> Result<TopicRecord> {
    let model = ctx.model();
    let corpus = ctx.corpus();
    let (labels, data): (Vec<String>, Vec<f32>) = model
        .top_words(topic, ctx.params().top_words)?
        .into_iter()
        .unzip();

    // positive-weight documents that carry at least one term
    let docs = model
        .top_documents(topic, None)?
        .into_iter()
        .filter(|&(doc, _)| corpus.rows()[doc].nnz() > 0)
        .collect();

    Ok(TopicRecord {
        topic_id: topic,
        word_distribution: Distribution::new(labels, data),
        topic_evolution: topic_evolution(ctx, topic)?,
        frequency: model.topic_share(topic)?,
        docs,
    })
}
