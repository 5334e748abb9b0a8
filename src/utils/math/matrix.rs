use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Row-major dense `f32` matrix.
/// Used for the document-topic and topic-word factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        DenseMatrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from equally sized rows.
    /// Returns `None` when the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Option<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let n = rows.len();
        let data = rows.into_iter().flatten().collect();
        Some(DenseMatrix { rows: n, cols, data })
    }

    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        DenseMatrix { rows, cols, data }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<f32> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Rows as mutable chunks, for row-parallel updates
    pub fn rows_mut(&mut self) -> std::slice::ChunksMut<'_, f32> {
        let cols = self.cols.max(1);
        self.data.chunks_mut(cols)
    }

    pub fn par_rows_mut(&mut self) -> rayon::slice::ChunksMut<'_, f32> {
        let cols = self.cols.max(1);
        self.data.par_chunks_mut(cols)
    }

    pub fn iter_rows(&self) -> std::slice::Chunks<'_, f32> {
        let cols = self.cols.max(1);
        self.data.chunks(cols)
    }

    pub fn transpose(&self) -> DenseMatrix {
        DenseMatrix::from_fn(self.cols, self.rows, |r, c| self.get(c, r))
    }

    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0f64; self.cols];
        for row in self.iter_rows().take(self.rows) {
            for (acc, &v) in sums.iter_mut().zip(row) {
                *acc += v as f64;
            }
        }
        sums
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(DenseMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).is_none());
    }

    #[test]
    fn transpose_and_columns() {
        let m = DenseMatrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let t = m.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.row(2), &[3.0, 6.0]);
        assert_eq!(m.column(1), vec![2.0, 5.0]);
        assert_eq!(m.column_sums(), vec![5.0, 7.0, 9.0]);
    }
}
