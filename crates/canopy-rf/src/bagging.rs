//! Bootstrap sampling of per-tree training sets and the pooled out-of-bag set.

use rand::Rng;

/// Index sets produced by [`sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaggedSets {
    /// One bootstrap sample per tree; each holds `n_records` indices drawn
    /// with replacement.
    pub train: Vec<Vec<usize>>,
    /// Indices never drawn by any tree, ascending, each once.
    pub oob: Vec<usize>,
}

/// Draw `n_trees` bootstrap samples over `n_records` records.
///
/// Samples are drawn sequentially from `rng`, so the result depends only on
/// the RNG state, not on how the trees are later trained.
pub fn sample(n_records: usize, n_trees: usize, rng: &mut impl Rng) -> BaggedSets {
    let mut drawn = vec![false; n_records];
    let mut train = Vec::with_capacity(n_trees);

    for _ in 0..n_trees {
        let mut indices = Vec::with_capacity(n_records);
        for _ in 0..n_records {
            let idx = rng.gen_range(0..n_records);
            indices.push(idx);
            drawn[idx] = true;
        }
        train.push(indices);
    }

    let oob = (0..n_records).filter(|&i| !drawn[i]).collect();
    BaggedSets { train, oob }
}
