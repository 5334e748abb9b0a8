use crate::utils::math::vector::ZeroSpVec;

/// Turns raw count rows into weighted rows.
///
/// `idf_vec` runs once at fit time; `weigh` runs for every document of
/// both the fit and the transform pass.
pub trait WeightingEngine {
    /// IDF vector for the fitted vocabulary
    /// # Arguments
    /// * `doc_freq` - document frequency of each vocabulary term, by id
    /// * `doc_num` - number of documents in the fit corpus
    fn idf_vec(doc_freq: &[u32], doc_num: usize) -> Vec<f32>;
    fn weigh(counts: &ZeroSpVec<u32>, idf: &[f32]) -> ZeroSpVec<f32>;
}

/// Raw term counts, no normalization
#[derive(Debug, Clone, Copy, Default)]
pub struct TfEngine;

impl WeightingEngine for TfEngine {
    fn idf_vec(doc_freq: &[u32], _doc_num: usize) -> Vec<f32> {
        vec![1.0; doc_freq.len()]
    }

    fn weigh(counts: &ZeroSpVec<u32>, _idf: &[f32]) -> ZeroSpVec<f32> {
        counts.map_values(|c| c as f32)
    }
}

/// Sublinear tf with smoothed idf, rows L2-normalized.
///
/// `tf = 1 + ln(count)`, `idf = ln((1 + n) / (1 + df)) + 1`
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfEngine;

impl WeightingEngine for TfIdfEngine {
    fn idf_vec(doc_freq: &[u32], doc_num: usize) -> Vec<f32> {
        let n = doc_num as f64;
        doc_freq
            .iter()
            .map(|&df| (((1.0 + n) / (1.0 + df as f64)).ln() + 1.0) as f32)
            .collect()
    }

    fn weigh(counts: &ZeroSpVec<u32>, idf: &[f32]) -> ZeroSpVec<f32> {
        let mut row: ZeroSpVec<f32> = counts.map_values(|c| c as f32);
        row.update_values(|idx, v| {
            let tf = 1.0 + (*v as f64).ln();
            *v = (tf * idf[idx] as f64) as f32;
        });
        row.l2_normalize();
        row
    }
}
