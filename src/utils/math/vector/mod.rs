pub mod math;
pub mod serde;

use std::fmt::{self, Debug};

use num::Num;

use crate::utils::sort::radix_sort_u32_soa;

/// ZeroSpVec is a sparse vector that treats zero elements as sparse.
/// It holds `inds` and `vals`:
/// `inds` keeps the logical index of each stored element,
/// `vals` keeps the element value.
///
/// Elements are guaranteed to be sorted by ascending index and no stored
/// value is zero.
#[derive(Clone, PartialEq)]
pub struct ZeroSpVec<N>
where
    N: Num + Copy,
{
    inds: Vec<u32>,
    vals: Vec<N>,
    len: usize,
}

impl<N> ZeroSpVec<N>
where
    N: Num + Copy,
{
    #[inline]
    pub fn new() -> Self {
        ZeroSpVec {
            inds: Vec::new(),
            vals: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        ZeroSpVec {
            inds: Vec::with_capacity(cap),
            vals: Vec::with_capacity(cap),
            len: 0,
        }
    }

    /// All-zero vector of logical length `len`
    #[inline]
    pub fn zeros(len: usize) -> Self {
        ZeroSpVec {
            inds: Vec::new(),
            vals: Vec::new(),
            len,
        }
    }

    /// Build from a dense slice, dropping zeros
    pub fn from_dense(dense: &[N]) -> Self {
        let mut vec = ZeroSpVec::with_capacity(dense.len() / 4);
        for &value in dense {
            vec.push(value);
        }
        vec
    }

    /// Build from unordered `(index, value)` pairs.
    /// Duplicate indices are summed and resulting zeros are dropped.
    ///
    /// # Arguments
    /// * `len` - logical length of the vector
    /// * `inds` - element indices, each `< len`
    /// * `vals` - element values, same length as `inds`
    pub fn from_unsorted(len: usize, mut inds: Vec<u32>, mut vals: Vec<N>) -> Self {
        debug_assert_eq!(inds.len(), vals.len());
        radix_sort_u32_soa(&mut inds, &mut vals);
        let mut vec = ZeroSpVec::with_capacity(inds.len());
        vec.len = len;
        for (idx, val) in inds.into_iter().zip(vals) {
            debug_assert!((idx as usize) < len, "index out of bounds");
            match vec.inds.last() {
                Some(&last) if last == idx => {
                    if let Some(acc) = vec.vals.last_mut() {
                        *acc = *acc + val;
                    }
                }
                _ => {
                    vec.inds.push(idx);
                    vec.vals.push(val);
                }
            }
        }
        vec.drop_zeros();
        vec
    }

    fn drop_zeros(&mut self) {
        if self.vals.iter().all(|v| !v.is_zero()) {
            return;
        }
        let mut write = 0;
        for read in 0..self.vals.len() {
            if !self.vals[read].is_zero() {
                self.inds[write] = self.inds[read];
                self.vals[write] = self.vals[read];
                write += 1;
            }
        }
        self.inds.truncate(write);
        self.vals.truncate(write);
    }

    #[inline]
    pub fn shrink_to_fit(&mut self) {
        self.inds.shrink_to_fit();
        self.vals.shrink_to_fit();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when no element is stored
    #[inline]
    pub fn is_all_zero(&self) -> bool {
        self.vals.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    #[inline]
    pub fn add_dim(&mut self, dim: usize) {
        self.len += dim;
    }

    /// Append one logical element at position `len`
    #[inline]
    pub fn push(&mut self, elem: N) {
        if !elem.is_zero() {
            self.inds.push(self.len as u32);
            self.vals.push(elem);
        }
        self.len += 1;
    }

    /// Value at `index`, zero for unstored positions.
    /// `None` if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> Option<N> {
        if index >= self.len {
            return None;
        }
        match self.inds.binary_search(&(index as u32)) {
            Ok(pos) => Some(self.vals[pos]),
            Err(_) => Some(N::zero()),
        }
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.inds
    }

    #[inline]
    pub fn values(&self) -> &[N] {
        &self.vals
    }

    /// Iterate stored `(index, value)` pairs in ascending index order
    #[inline]
    pub fn raw_iter(&self) -> impl Iterator<Item = (usize, N)> + '_ {
        self.inds
            .iter()
            .zip(self.vals.iter())
            .map(|(&idx, &val)| (idx as usize, val))
    }

    pub fn to_dense(&self) -> Vec<N> {
        let mut dense = vec![N::zero(); self.len];
        for (idx, val) in self.raw_iter() {
            dense[idx] = val;
        }
        dense
    }

    /// Apply `f` to every stored value, dropping results that become zero
    pub fn map_values<M, F>(&self, mut f: F) -> ZeroSpVec<M>
    where
        M: Num + Copy,
        F: FnMut(N) -> M,
    {
        let mut out = ZeroSpVec::with_capacity(self.nnz());
        out.len = self.len;
        for (idx, val) in self.raw_iter() {
            let mapped = f(val);
            if !mapped.is_zero() {
                out.inds.push(idx as u32);
                out.vals.push(mapped);
            }
        }
        out
    }

    /// Mutate stored values in place. Zeros written by `f` are removed.
    pub fn update_values<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, &mut N),
    {
        for (idx, val) in self.inds.iter().zip(self.vals.iter_mut()) {
            f(*idx as usize, val);
        }
        self.drop_zeros();
    }
}

impl<N> Default for ZeroSpVec<N>
where
    N: Num + Copy,
{
    #[inline]
    fn default() -> Self {
        ZeroSpVec::new()
    }
}

impl<N: Num + Copy + Debug> Debug for ZeroSpVec<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "ZeroSpVec(len={}, {:?})", self.len, self.raw_iter().collect::<Vec<_>>())
        } else {
            f.debug_struct("ZeroSpVec")
                .field("len", &self.len)
                .field("nnz", &self.nnz())
                .finish()
        }
    }
}
