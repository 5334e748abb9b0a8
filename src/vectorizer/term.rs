use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// TermFrequency struct
/// Counts the occurrences of every n-gram of one document.
///
/// Tokens are whitespace separated. An n-gram is `n` consecutive tokens joined
/// by a single space.
///
/// # Examples
/// ```
/// use topic_explorer::vectorizer::term::TermFrequency;
/// let freq = TermFrequency::from_text("the cat the", (1, 2));
/// assert_eq!(freq.term_count("the"), 2);
/// assert_eq!(freq.term_count("the cat"), 1);
/// assert_eq!(freq.total_term_count(), 5);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TermFrequency {
    #[serde(with = "indexmap::map::serde_seq")]
    term_count: IndexMap<String, u32>,
    total_term_count: u64,
    token_count: u64,
}

impl TermFrequency {
    pub fn new() -> Self {
        TermFrequency::default()
    }

    /// Count the n-grams of `text` for every `n` in `ngram_range` (inclusive)
    pub fn from_text(text: &str, ngram_range: (usize, usize)) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut freq = TermFrequency::new();
        freq.token_count = tokens.len() as u64;
        let (min_n, max_n) = ngram_range;
        for n in min_n.max(1)..=max_n {
            if n > tokens.len() {
                break;
            }
            if n == 1 {
                for token in &tokens {
                    freq.add_term(token);
                }
            } else {
                for window in tokens.windows(n) {
                    freq.add_term(&window.join(" "));
                }
            }
        }
        freq
    }

    /// Add a term
    ///
    /// # Arguments
    /// * `term` - term to add
    #[inline]
    pub fn add_term(&mut self, term: &str) -> &mut Self {
        match self.term_count.get_mut(term) {
            Some(count) => *count += 1,
            None => {
                self.term_count.insert(term.to_string(), 1);
            }
        }
        self.total_term_count += 1;
        self
    }

    /// Occurrences of `term`, 0 when absent
    #[inline]
    pub fn term_count(&self, term: &str) -> u32 {
        self.term_count.get(term).copied().unwrap_or(0)
    }

    /// Sum of all n-gram occurrences
    #[inline]
    pub fn total_term_count(&self) -> u64 {
        self.total_term_count
    }

    /// Number of whitespace tokens in the source text
    #[inline]
    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    #[inline]
    pub fn term_num(&self) -> usize {
        self.term_count.len()
    }

    /// `(term, count)` pairs in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.term_count.iter().map(|(term, &count)| (term.as_str(), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unigrams_split_on_any_whitespace() {
        let freq = TermFrequency::from_text("  alpha\tbeta\nalpha ", (1, 1));
        assert_eq!(freq.term_count("alpha"), 2);
        assert_eq!(freq.term_count("beta"), 1);
        assert_eq!(freq.term_num(), 2);
        assert_eq!(freq.token_count(), 3);
    }

    #[test]
    fn bigrams_only() {
        let freq = TermFrequency::from_text("a b c", (2, 2));
        assert_eq!(freq.term_count("a"), 0);
        assert_eq!(freq.term_count("a b"), 1);
        assert_eq!(freq.term_count("b c"), 1);
        assert_eq!(freq.total_term_count(), 2);
    }

    #[test]
    fn short_text_has_no_long_ngrams() {
        let freq = TermFrequency::from_text("solo", (1, 3));
        assert_eq!(freq.term_num(), 1);
        assert!(TermFrequency::from_text("", (1, 1)).iter().next().is_none());
    }
}
