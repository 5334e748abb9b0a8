use crate::aggregate::AggregationContext;
use crate::error::Result;
use crate::index::SimilarityIndex;
use crate::storage::schema::{metadata_value, topic_distribution, DocRecord, WordEntry};
use crate::utils::normalizer::round_to;
use crate::utils::sort::rank_desc;

/// Neighbors of `doc` with scores rounded to 3 decimals
fn similar_docs(index: &dyn SimilarityIndex, doc: usize, k: usize) -> Result<Vec<(usize, f64)>> {
    Ok(index
        .query(doc, k)?
        .into_iter()
        .map(|(other, score)| (other, round_to(score as f64, 3)))
        .collect())
}

/// Non-zero terms of `doc`, descending weight, ties by ascending word id
pub fn word_list(ctx: &AggregationContext, doc: usize) -> Result<Vec<WordEntry>> {
    let corpus = ctx.corpus();
    let mut weighted: Vec<(usize, f32)> = corpus
        .vector_for_document(doc)?
        .raw_iter()
        .filter(|&(_, w)| w != 0.0)
        .collect();
    rank_desc(&mut weighted);
    weighted
        .into_iter()
        .map(|(id, w)| Ok((corpus.word_for_id(id)?.to_string(), w, id)))
        .collect()
}

pub fn compute_doc(ctx: &AggregationContext, doc: usize) -> Result<DocRecord> {
    let k = ctx.params().nb_similar_docs;
    let document = ctx.corpus().document(doc)?;
    let metadata = ctx
        .metadata_fields()
        .iter()
        .map(|field| metadata_value(document, field))
        .collect();
    Ok(DocRecord {
        doc_id: doc,
        topic_distribution: topic_distribution(ctx.model().topic_distribution_for_document(doc)?),
        topic_similarity: similar_docs(ctx.doc_topic_index.as_ref(), doc, k)?,
        vector_similarity: similar_docs(ctx.doc_vector_index.as_ref(), doc, k)?,
        word_list: word_list(ctx, doc)?,
        metadata,
    })
}
