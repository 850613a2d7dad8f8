//! Deterministic batch iteration with reproducible train/test splits.

use ndarray::Array1;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use super::loader::{ActionDataset, AdjacencySet, NodeBlock};

/// Selects one side of a seeded k-fold partition. The fold count is derived
/// from the train ratio as `round(1 / (1 - train_ratio))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub is_train: bool,
    pub train_ratio: f64,
    pub fold: usize,
}

/// Options for [ActionDataset::batches]. A `batch_size` of zero yields one
/// batch holding every selected example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
    pub split: Option<SplitSpec>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            batch_size: 0,
            shuffle: false,
            seed: 42,
            split: None,
        }
    }
}

/// Standard k-fold splitter over `0..n_samples`: the sample indices
/// (optionally shuffled by a seeded RNG) are cut into `n_splits` contiguous
/// folds, the first `n % k` of them one sample larger. Fold `k` is the test
/// side; the remaining indices are the train side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KFold {
    n_splits: usize,
    shuffle: bool,
    seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, shuffle: bool, seed: u64) -> KFold {
        assert!(n_splits >= 2, "k-fold needs at least two folds");
        KFold {
            n_splits,
            shuffle,
            seed,
        }
    }

    /// Returns `(train, test)` indices for `fold`.
    pub fn split(&self, n_samples: usize, fold: usize) -> (Vec<usize>, Vec<usize>) {
        assert!(fold < self.n_splits, "fold out of range");
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            indices.shuffle(&mut StdRng::seed_from_u64(self.seed));
        }
        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut start = 0;
        let mut bounds = (0, 0);
        for i in 0..self.n_splits {
            let size = base + usize::from(i < remainder);
            if i == fold {
                bounds = (start, start + size);
            }
            start += size;
        }
        let (test_start, test_end) = bounds;
        let test = indices[test_start..test_end].to_vec();
        let mut train = indices[..test_start].to_vec();
        train.extend_from_slice(&indices[test_end..]);
        (train, test)
    }
}

/// One batch of decoded examples as parallel lists. `aux` is present only
/// when the container carries per-example auxiliary features.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub adjacency: Vec<AdjacencySet>,
    pub nodes: Vec<NodeBlock>,
    pub aux: Option<Vec<Array1<f64>>>,
    pub labels: Vec<Array1<f64>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Lazy, finite, non-restartable batch sequence over a dataset. The final
/// partial batch is yielded when non-empty.
pub struct Batches<'a> {
    dataset: &'a ActionDataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = if self.batch_size == 0 {
            self.order.len()
        } else {
            (self.cursor + self.batch_size).min(self.order.len())
        };
        let with_aux = !self.dataset.y_features().is_empty();
        let mut batch = Batch {
            adjacency: Vec::with_capacity(end - self.cursor),
            nodes: Vec::with_capacity(end - self.cursor),
            aux: with_aux.then(|| Vec::with_capacity(end - self.cursor)),
            labels: Vec::with_capacity(end - self.cursor),
        };
        for &index in &self.order[self.cursor..end] {
            let example = self.dataset.example(index);
            batch.adjacency.push(example.adjacency);
            batch.nodes.push(example.nodes);
            if let (Some(aux), Some(row)) = (batch.aux.as_mut(), example.aux) {
                aux.push(row);
            }
            batch.labels.push(example.label);
        }
        self.cursor = end;
        Some(batch)
    }
}

impl ActionDataset {
    /// Builds the deterministic batch sequence described by `options`:
    /// an optional seeded k-fold split selects the train or test side,
    /// examples with no selected nodes are skipped on both sides
    /// consistently, and an optional seeded shuffle fixes the emission
    /// order.
    pub fn batches(&self, options: &BatchOptions) -> Batches<'_> {
        let num_examples = self.len();
        let side: Vec<usize> = match options.split {
            Some(split) => {
                assert!(
                    split.train_ratio > 0.0 && split.train_ratio < 1.0,
                    "train_ratio must lie strictly between 0 and 1"
                );
                let n_splits = (1.0 / (1.0 - split.train_ratio)).round() as usize;
                let kfold = KFold::new(n_splits, options.shuffle, options.seed);
                let (train, test) = kfold.split(num_examples, split.fold);
                if split.is_train {
                    train
                } else {
                    test
                }
            }
            None => (0..num_examples).collect(),
        };
        let mut order: Vec<usize> = side
            .into_iter()
            .filter(|&index| !self.selected_node_indices()[index].is_empty())
            .collect();
        if options.shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(options.seed));
        }
        Batches {
            dataset: self,
            order,
            batch_size: options.batch_size,
            cursor: 0,
        }
    }
}
