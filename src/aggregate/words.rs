use crate::aggregate::AggregationContext;
use crate::error::Result;
use crate::index::SimilarityIndex;
use crate::storage::schema::{topic_distribution, SimilarWord, WordRecord};
use crate::utils::sort::rank_desc;

/// Documents containing `word`, weighted by `weight × ln(N / df)`,
/// descending, ties by ascending doc id
pub fn weighted_docs(ctx: &AggregationContext, word: usize) -> Result<Vec<(usize, f32)>> {
    let corpus = ctx.corpus();
    let postings = corpus.postings(word)?;
    if postings.is_empty() {
        return Ok(Vec::new());
    }
    let idf = (corpus.size() as f64 / postings.len() as f64).ln();
    let mut docs: Vec<(usize, f32)> = postings
        .iter()
        .map(|&(doc, w)| (doc as usize, (w as f64 * idf) as f32))
        .collect();
    rank_desc(&mut docs);
    Ok(docs)
}

fn similar_words(ctx: &AggregationContext, index: &dyn SimilarityIndex, word: usize) -> Result<Vec<SimilarWord>> {
    index
        .query(word, ctx.params().nb_similar_words)?
        .into_iter()
        .map(|(other, weight)| {
            Ok(SimilarWord {
                word: ctx.corpus().word_for_id(other)?.to_string(),
                weight,
            })
        })
        .collect()
}

pub fn compute_word(ctx: &AggregationContext, word: usize) -> Result<WordRecord> {
    Ok(WordRecord {
        word_id: word,
        word: ctx.corpus().word_for_id(word)?.to_string(),
        distribution_across_topics: topic_distribution(ctx.model().topic_distribution_for_word(word)?),
        docs: weighted_docs(ctx, word)?,
        similar_words_by_topic: similar_words(ctx, ctx.word_topic_index.as_ref(), word)?,
        similar_words_by_cooc: similar_words(ctx, ctx.word_cooc_index.as_ref(), word)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::small_context;

    #[test]
    fn doc_weights_use_log_idf() {
        let ctx = small_context(1);
        let corpus = ctx.corpus();
        let water = corpus.id_for_word("water").unwrap();
        let docs = weighted_docs(&ctx, water).unwrap();
        assert_eq!(docs.len(), 3);
        let idf = (6.0f64 / 3.0).ln();
        let raw = corpus.vector_for_document(docs[0].0).unwrap().get(water).unwrap();
        assert!((docs[0].1 as f64 - raw as f64 * idf).abs() < 1e-5);
        assert!(docs.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn similar_words_exclude_the_word() {
        let ctx = small_context(1);
        let judge = ctx.corpus().id_for_word("judge").unwrap();
        let record = compute_word(&ctx, judge).unwrap();
        assert_eq!(record.word, "judge");
        for list in [&record.similar_words_by_topic, &record.similar_words_by_cooc] {
            assert_eq!(list.len(), 4);
            assert!(list.iter().all(|s| s.word != "judge"));
            assert!(list.iter().all(|s| (0.0..=1.0).contains(&s.weight)));
        }
        // judge always appears with law
        assert_eq!(record.similar_words_by_cooc[0].word, "law");
    }
}
