use rayon::prelude::*;

use crate::error::{EntityKind, Error, Result};
use crate::index::{similarity, SimilarityIndex, VectorSpace};
use crate::utils::sort::top_k_desc;

/// Full scan of every item, parallel over candidates
#[derive(Debug, Clone)]
pub struct ExactIndex<S: VectorSpace> {
    space: S,
    kind: EntityKind,
}

impl<S: VectorSpace> ExactIndex<S> {
    pub fn new(space: S, kind: EntityKind) -> Self {
        ExactIndex { space, kind }
    }

    pub fn space(&self) -> &S {
        &self.space
    }
}

/// Rank `candidates` against `item`, self excluded
pub(crate) fn rank_candidates<S, I>(space: &S, item: usize, candidates: I, k: usize) -> Vec<(usize, f32)>
where
    S: VectorSpace + ?Sized,
    I: IntoParallelIterator<Item = usize>,
{
    let scored: Vec<(usize, f32)> = candidates
        .into_par_iter()
        .filter(|&other| other != item)
        .map(|other| (other, similarity(space, item, other)))
        .collect();
    top_k_desc(scored, k)
}

impl<S: VectorSpace> SimilarityIndex for ExactIndex<S> {
    fn len(&self) -> usize {
        self.space.len()
    }

    fn query(&self, item: usize, k: usize) -> Result<Vec<(usize, f32)>> {
        if item >= self.space.len() {
            return Err(Error::missing(self.kind, item));
        }
        Ok(rank_candidates(&self.space, item, 0..self.space.len(), k))
    }
}
