//! Conversions between the three representations of sparse relational data.
//!
//! Every per-item action adjacency moves through three equivalent forms:
//!
//! - **Dense matrix**: a square `Array2<f64>` where absent entries hold a
//!   designated default value.
//! - **Triple list**: the flattened `(row, col, value)` records for every
//!   non-default entry, in row-major order.
//! - **Coordinate (COO) form**: a `2×E` index array plus the `E`-length
//!   edge-attribute vector, for consumers that take sparse inputs.
//!
//! All functions here are pure; the [crate::dataset::ActionDataset] decodes
//! through them and the [crate::propagation::PropagationNet] encodes through
//! them. [matrix_to_list] and [list_to_matrix] are exact inverses for
//! matrices whose non-default entries are representable.

use ndarray::{Array1, Array2};

/// One non-default adjacency entry: `(row, col, value)`.
pub type Triple = (usize, usize, f64);

/// Scans a square matrix and returns every `(row, col, value)` whose value
/// differs from `default_value`, in row-major order.
pub fn matrix_to_list(matrix: &Array2<f64>, default_value: f64) -> Vec<Triple> {
    let mut list = Vec::new();
    for ((i, j), &val) in matrix.indexed_iter() {
        if val != default_value {
            list.push((i, j, val));
        }
    }
    list
}

/// Builds a `size×size` matrix filled with `default_value`, then writes each
/// triple at its coordinates. Later duplicates for the same `(i, j)`
/// overwrite earlier ones.
///
/// Panics if any triple indexes outside `size`.
pub fn list_to_matrix(list: &[Triple], size: usize, default_value: f64) -> Array2<f64> {
    let mut matrix = Array2::from_elem((size, size), default_value);
    for &(i, j, val) in list {
        matrix[[i, j]] = val;
    }
    matrix
}

/// Returns the `2×E` array of `(row, col)` coordinate pairs, dropping the
/// value component. An empty input yields a `2×0` array.
pub fn list_to_coo(list: &[Triple]) -> Array2<usize> {
    let mut coo = Array2::zeros((2, list.len()));
    for (e, &(i, j, _)) in list.iter().enumerate() {
        coo[[0, e]] = i;
        coo[[1, e]] = j;
    }
    coo
}

/// Returns the `E`-length array of values only, order preserved.
pub fn list_to_edge_attr(list: &[Triple]) -> Array1<f64> {
    list.iter().map(|&(_, _, val)| val).collect()
}

/// An all-ones feature block, the default node-feature table when the caller
/// supplies nothing richer.
pub fn ones_features(num_nodes: usize, num_features: usize) -> Array2<f64> {
    Array2::ones((num_nodes, num_features))
}
