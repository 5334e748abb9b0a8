//! Random-projection forest.
//!
//! Every inner node picks two pivot items `p` and `q` and sends an item `x`
//! left when `cos(x, p) >= cos(x, q)`. A query gathers the leaves holding
//! the item in every tree, then ranks those candidates exactly. When the
//! leaves hold fewer than `k` other items the query scans everything.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{EntityKind, Error, Result};
use crate::index::exact::rank_candidates;
use crate::index::{IndexParams, SimilarityIndex, VectorSpace};

const MAX_DEPTH: usize = 64;

/// Leaves of one tree; inner splits are only needed while building
#[derive(Debug, Clone)]
struct Tree {
    leaves: Vec<Vec<u32>>,
    /// leaf of every item
    leaf_of: Vec<usize>,
}

impl Tree {
    fn build<S: VectorSpace>(space: &S, leaf_size: usize, seed: u64) -> Tree {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tree = Tree {
            leaves: Vec::new(),
            leaf_of: vec![0; space.len()],
        };
        let all: Vec<u32> = (0..space.len() as u32).collect();
        tree.grow(space, all, leaf_size, 0, &mut rng);
        tree
    }

    fn grow<S: VectorSpace>(
        &mut self,
        space: &S,
        items: Vec<u32>,
        leaf_size: usize,
        depth: usize,
        rng: &mut StdRng,
    ) {
        if items.len() <= leaf_size.max(1) || depth >= MAX_DEPTH {
            self.leaf(items);
            return;
        }
        let a = rng.gen_range(0..items.len());
        let mut b = rng.gen_range(0..items.len() - 1);
        if b >= a {
            b += 1;
        }
        let (p, q) = (items[a] as usize, items[b] as usize);
        let (left, right): (Vec<u32>, Vec<u32>) = items
            .iter()
            .partition(|&&x| space.cosine(x as usize, p) >= space.cosine(x as usize, q));
        // parallel pivots cannot split
        if left.is_empty() || right.is_empty() {
            self.leaf(items);
            return;
        }
        self.grow(space, left, leaf_size, depth + 1, rng);
        self.grow(space, right, leaf_size, depth + 1, rng);
    }

    fn leaf(&mut self, items: Vec<u32>) {
        let id = self.leaves.len();
        for &item in &items {
            self.leaf_of[item as usize] = id;
        }
        self.leaves.push(items);
    }

    fn leaf_items(&self, item: usize) -> &[u32] {
        &self.leaves[self.leaf_of[item]]
    }
}

#[derive(Debug, Clone)]
pub struct ForestIndex<S: VectorSpace> {
    space: S,
    kind: EntityKind,
    trees: Vec<Tree>,
}

impl<S: VectorSpace> ForestIndex<S> {
    /// Build `params.nb_trees` trees, tree `i` seeded with `seed + i`
    pub fn build(space: S, kind: EntityKind, params: &IndexParams) -> Self {
        let nb_trees = params.nb_trees.max(1);
        let trees = (0..nb_trees)
            .into_par_iter()
            .map(|i| Tree::build(&space, params.leaf_size, params.seed.wrapping_add(i as u64)))
            .collect();
        ForestIndex { space, kind, trees }
    }

    fn candidates(&self, item: usize) -> Vec<usize> {
        let set: BTreeSet<u32> = self
            .trees
            .iter()
            .flat_map(|t| t.leaf_items(item).iter().copied())
            .collect();
        set.into_iter().map(|i| i as usize).collect()
    }
}

impl<S: VectorSpace> SimilarityIndex for ForestIndex<S> {
    fn len(&self) -> usize {
        self.space.len()
    }

    fn query(&self, item: usize, k: usize) -> Result<Vec<(usize, f32)>> {
        if item >= self.space.len() {
            return Err(Error::missing(self.kind, item));
        }
        let candidates = self.candidates(item);
        // candidates include the item itself
        if candidates.len() <= k {
            return Ok(rank_candidates(&self.space, item, 0..self.space.len(), k));
        }
        Ok(rank_candidates(&self.space, item, candidates, k))
    }
}
