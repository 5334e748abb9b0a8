use std::cmp::Ordering;

use num::Num;

use super::ZeroSpVec;

impl<N> ZeroSpVec<N>
where
    N: Num + Copy + Into<f64>,
{
    /// Dot product by merging the two index lists
    ///
    /// # Arguments
    /// * `other` - vector of the same logical length
    ///
    /// # Returns
    /// * `f64` - dot product
    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        debug_assert_eq!(
            self.len(),
            other.len(),
            "Vectors must be of the same length to compute dot product."
        );
        let (a_inds, a_vals) = (self.indices(), self.values());
        let (b_inds, b_vals) = (other.indices(), other.values());
        let mut result = 0.0;
        let mut i = 0;
        let mut j = 0;
        while i < a_inds.len() && j < b_inds.len() {
            match a_inds[i].cmp(&b_inds[j]) {
                Ordering::Equal => {
                    result += a_vals[i].into() * b_vals[j].into();
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        result
    }

    #[inline]
    pub fn norm_sq(&self) -> f64 {
        self.values()
            .iter()
            .map(|&v| {
                let v: f64 = v.into();
                v * v
            })
            .sum()
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Cosine similarity, 0.0 when either side is all-zero
    #[inline]
    pub fn cosine(&self, other: &Self) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }

    /// Largest stored value, zero for an all-zero vector
    pub fn max_value(&self) -> f64 {
        self.values()
            .iter()
            .map(|&v| v.into())
            .fold(0.0, f64::max)
    }
}

impl ZeroSpVec<f32> {
    /// Scale to unit L2 norm. An all-zero vector is left unchanged.
    pub fn l2_normalize(&mut self) {
        let norm = self.norm();
        if norm == 0.0 {
            return;
        }
        let inv = (1.0 / norm) as f32;
        self.update_values(|_, v| *v *= inv);
    }
}
