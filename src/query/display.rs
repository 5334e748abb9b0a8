//! Word cloud shading for the document view.

use serde::Serialize;

use crate::storage::schema::WordEntry;

/// Words shown per document
pub const DISPLAY_WORDS: usize = 50;

/// One opacity per bucket, 0 through 10
pub const OPACITIES: [f32; 11] = [0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95, 1.0];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayWord {
    pub word: String,
    /// bucket / 10
    pub weight: f32,
    pub word_id: usize,
    pub opacity: f32,
    pub color: String,
}

/// Bucket 0..=10 of every scaled weight.
///
/// `hi` and `lo` are the extremes of the set (`lo` is 0 for a single
/// weight); a bucket is `round((w - lo) / ((hi - lo) / 10))`, ties to even.
pub fn buckets(scaled: &[f64]) -> Vec<u8> {
    if scaled.is_empty() {
        return Vec::new();
    }
    let hi = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lo = if scaled.len() > 1 {
        scaled.iter().copied().fold(f64::INFINITY, f64::min)
    } else {
        0.0
    };
    let mut coeff = (hi - lo) / 10.0;
    if coeff == 0.0 {
        coeff = 1.0;
    }
    scaled
        .iter()
        .map(|&w| {
            let bucket = ((w - lo) / coeff).round_ties_even();
            if bucket.is_finite() {
                bucket.clamp(0.0, 10.0) as u8
            } else {
                0
            }
        })
        .collect()
}

pub fn color(opacity: f32) -> String {
    format!("rgba(26,114,159, {opacity})")
}

/// Shade the top positive words of a ranked word list, then sort them by word
pub fn display_words(word_list: &[WordEntry]) -> Vec<DisplayWord> {
    let top: Vec<&WordEntry> = word_list
        .iter()
        .filter(|(_, w, _)| *w > 0.0)
        .take(DISPLAY_WORDS)
        .collect();
    let scaled: Vec<f64> = top.iter().map(|(_, w, _)| *w as f64 * 10.0).collect();
    let mut words: Vec<DisplayWord> = top
        .into_iter()
        .zip(buckets(&scaled))
        .map(|((word, _, id), bucket)| {
            let opacity = OPACITIES[bucket as usize];
            DisplayWord {
                word: word.clone(),
                weight: bucket as f32 / 10.0,
                word_id: *id,
                opacity,
                color: color(opacity),
            }
        })
        .collect();
    words.sort_by(|a, b| a.word.cmp(&b.word));
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_maps_to_ten_buckets() {
        assert_eq!(buckets(&[50.0, 40.0, 10.0]), vec![10, 8, 0]);
    }

    #[test]
    fn single_weight_uses_zero_floor() {
        assert_eq!(buckets(&[3.0]), vec![10]);
    }

    #[test]
    fn equal_weights_do_not_divide_by_zero() {
        assert_eq!(buckets(&[2.0, 2.0]), vec![0, 0]);
    }

    #[test]
    fn display_list_is_alphabetical_with_opacities() {
        let list: Vec<WordEntry> = vec![
            ("zeta".to_string(), 5.0, 2),
            ("alpha".to_string(), 4.0, 0),
            ("mu".to_string(), 1.0, 1),
            ("nil".to_string(), 0.0, 3),
        ];
        let words = display_words(&list);
        assert_eq!(
            words.iter().map(|w| w.word.as_str()).collect::<Vec<_>>(),
            vec!["alpha", "mu", "zeta"]
        );
        let opacities: Vec<f32> = words.iter().map(|w| w.opacity).collect();
        assert_eq!(opacities, vec![0.9, 0.5, 1.0]);
        assert_eq!(words[2].weight, 1.0);
        assert_eq!(words[0].color, "rgba(26,114,159, 0.9)");
    }

    #[test]
    fn only_the_top_words_are_shaded() {
        let list: Vec<WordEntry> = (0..80)
            .map(|i| (format!("w{i:02}"), 80.0 - i as f32, i))
            .collect();
        assert_eq!(display_words(&list).len(), DISPLAY_WORDS);
    }
}
