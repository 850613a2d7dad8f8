//! The shard container: typed accumulation, per-example decode, and sharded
//! persistence.

use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    codec::{list_to_coo, list_to_edge_attr, list_to_matrix, matrix_to_list, Triple},
    error::CascadeError,
    properties::ActionKey,
};

/// File extension for persisted dataset shards.
pub const SHARD_EXT: &str = "bin";

/// A fixed-width numeric table that grows along its leading axis.
///
/// This is the typed rendering of the "numeric array or nothing yet" fields:
/// an empty table adopts the first block it is given, and every later block
/// is concatenated along axis 0. Width mismatches are contract violations.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable(Option<Array2<f64>>);

impl FeatureTable {
    pub fn empty() -> FeatureTable {
        FeatureTable(None)
    }

    /// Appends `rows` along the leading axis; an empty table adopts them.
    /// Zero-row blocks are ignored.
    pub fn concat(&mut self, rows: Array2<f64>) {
        if rows.nrows() == 0 {
            return;
        }
        match self.0.take() {
            None => self.0 = Some(rows),
            Some(existing) => {
                assert_eq!(
                    existing.ncols(),
                    rows.ncols(),
                    "cannot concatenate a {}-column block onto a {}-column table",
                    rows.ncols(),
                    existing.ncols()
                );
                let joined = concatenate(Axis(0), &[existing.view(), rows.view()])
                    .expect("matching widths asserted above");
                self.0 = Some(joined);
            }
        }
    }

    pub fn as_array(&self) -> Option<&Array2<f64>> {
        self.0.as_ref()
    }

    pub fn num_rows(&self) -> usize {
        self.0.as_ref().map_or(0, Array2::nrows)
    }

    pub fn num_cols(&self) -> Option<usize> {
        self.0.as_ref().map(Array2::ncols)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// An owned copy of row `index`.
    pub fn row(&self, index: usize) -> Array1<f64> {
        self.0
            .as_ref()
            .expect("row lookup on an empty table")
            .row(index)
            .to_owned()
    }

    /// An owned copy of rows `start..end`, with both bounds clamped to the
    /// table length.
    pub fn slice_rows(&self, start: usize, end: usize) -> Array2<f64> {
        let n = self.num_rows();
        let start = start.min(n);
        let end = end.min(n).max(start);
        match self.0.as_ref() {
            Some(table) => table.slice(ndarray::s![start..end, ..]).to_owned(),
            None => Array2::zeros((0, 0)),
        }
    }
}

impl From<Array2<f64>> for FeatureTable {
    fn from(table: Array2<f64>) -> FeatureTable {
        let mut out = FeatureTable::empty();
        out.concat(table);
        out
    }
}

/// Coordinate-form adjacency for one action: a `2×E` index array plus the
/// `E`-length edge-attribute vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix {
    pub indices: Array2<usize>,
    pub values: Array1<f64>,
}

/// Per-action adjacency of one decoded example, in the representation the
/// container was configured with.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjacencySet {
    Dense(Vec<Array2<f64>>),
    Coo(Vec<CooMatrix>),
}

/// Node-feature block of one decoded example: either the selected global
/// node indices (embedding lookup deferred to the consumer) or the gathered
/// dense feature rows.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBlock {
    Indices(Vec<usize>),
    Features(Array2<f64>),
}

/// One decoded training example.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub adjacency: AdjacencySet,
    pub nodes: NodeBlock,
    /// Present only when the container carries per-example auxiliary
    /// features.
    pub aux: Option<Array1<f64>>,
    pub label: Array1<f64>,
}

/// One shard of serialized training examples.
///
/// Grows only through the `update_*` accumulation methods; representation
/// flags are fixed per instance and control [ActionDataset::example] decode
/// behavior. Feature widths and the class count are captured from the first
/// non-empty update and every later update is checked against them.
///
/// Sharded `dump` partitions the example axis and the `x_features` row axis
/// independently. Precondition: an example must only reference `x_features`
/// rows that land in its own shard's slice, otherwise a reloaded subset of
/// shards can hold dangling row references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDataset {
    path: PathBuf,
    actions: Vec<ActionKey>,
    /// Per example, one triple list per action, in local node indices.
    edge_lists: Vec<Vec<Vec<Triple>>>,
    /// Per example, the global node indices participating in it.
    selected_node_indices: Vec<Vec<usize>>,
    x_features: FeatureTable,
    y_features: FeatureTable,
    ys: FeatureTable,
    num_x_features: Option<usize>,
    num_y_features: Option<usize>,
    num_classes: Option<usize>,
    is_coo_repr: bool,
    is_x_indices_repr: bool,
}

impl ActionDataset {
    /// Creates an empty container rooted at `path` (created if absent).
    pub fn new(
        path: impl AsRef<Path>,
        actions: Vec<ActionKey>,
        is_coo_repr: bool,
        is_x_indices_repr: bool,
    ) -> Result<ActionDataset, CascadeError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(ActionDataset {
            path,
            actions,
            edge_lists: Vec::new(),
            selected_node_indices: Vec::new(),
            x_features: FeatureTable::empty(),
            y_features: FeatureTable::empty(),
            ys: FeatureTable::empty(),
            num_x_features: None,
            num_y_features: None,
            num_classes: None,
            is_coo_repr,
            is_x_indices_repr,
        })
    }

    /// Number of accumulated examples.
    ///
    /// Panics if the example-aligned fields have diverged in length.
    pub fn len(&self) -> usize {
        assert_eq!(
            self.edge_lists.len(),
            self.ys.num_rows(),
            "edge_lists and ys must stay parallel"
        );
        self.edge_lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_lists.is_empty()
    }

    pub fn actions(&self) -> &[ActionKey] {
        &self.actions
    }

    pub fn num_x_features(&self) -> Option<usize> {
        self.num_x_features
    }

    pub fn num_y_features(&self) -> Option<usize> {
        self.num_y_features
    }

    pub fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    pub fn x_features(&self) -> &FeatureTable {
        &self.x_features
    }

    pub fn y_features(&self) -> &FeatureTable {
        &self.y_features
    }

    pub fn selected_node_indices(&self) -> &[Vec<usize>] {
        &self.selected_node_indices
    }

    pub fn edge_lists(&self) -> &[Vec<Vec<Triple>>] {
        &self.edge_lists
    }

    // Decode

    /// Decodes example `index` per the container's representation flags:
    /// per-action adjacencies as COO pairs or dense local matrices, the
    /// node block as raw selected indices or gathered feature rows, plus the
    /// auxiliary feature row when present, plus the label.
    pub fn example(&self, index: usize) -> Example {
        let indices = &self.selected_node_indices[index];
        let per_action = &self.edge_lists[index];

        let adjacency = if self.is_coo_repr {
            AdjacencySet::Coo(
                per_action
                    .iter()
                    .map(|list| CooMatrix {
                        indices: list_to_coo(list),
                        values: list_to_edge_attr(list),
                    })
                    .collect(),
            )
        } else {
            AdjacencySet::Dense(
                per_action
                    .iter()
                    .map(|list| list_to_matrix(list, indices.len(), 0.0))
                    .collect(),
            )
        };

        let nodes = if self.is_x_indices_repr {
            NodeBlock::Indices(indices.clone())
        } else {
            let table = self
                .x_features
                .as_array()
                .expect("x_features must be populated to gather dense node features");
            NodeBlock::Features(table.select(Axis(0), indices))
        };

        let aux = if self.y_features.is_empty() {
            None
        } else {
            Some(self.y_features.row(index))
        };

        Example {
            adjacency,
            nodes,
            aux,
            label: self.ys.row(index),
        }
    }

    // Accumulation

    /// Appends dense per-example, per-action matrices, encoding each into
    /// triple-list form first.
    pub fn update_matrices(
        &mut self,
        matrices_sequence: &[Vec<Array2<f64>>],
        selected_node_indices: Vec<Vec<usize>>,
    ) {
        let lists = matrices_sequence
            .iter()
            .map(|matrices| {
                matrices
                    .iter()
                    .map(|matrix| matrix_to_list(matrix, 0.0))
                    .collect()
            })
            .collect();
        self.update_matrix_lists(lists, selected_node_indices);
    }

    /// Appends pre-encoded per-example, per-action triple lists together
    /// with the node indices that define each example's local index space.
    pub fn update_matrix_lists(
        &mut self,
        matrix_lists: Vec<Vec<Vec<Triple>>>,
        selected_node_indices: Vec<Vec<usize>>,
    ) {
        assert_eq!(
            matrix_lists.len(),
            selected_node_indices.len(),
            "matrix lists and selected indices must stay parallel"
        );
        for (lists, indices) in matrix_lists.iter().zip(selected_node_indices.iter()) {
            assert_eq!(
                lists.len(),
                self.actions.len(),
                "each example carries one list per action"
            );
            let bound = indices.len();
            for list in lists {
                assert!(
                    list.iter().all(|&(i, j, _)| i < bound && j < bound),
                    "local indices must stay below the selected node count"
                );
            }
        }
        self.edge_lists.extend(matrix_lists);
        self.selected_node_indices.extend(selected_node_indices);
    }

    /// Appends global node-feature rows. The feature width is captured from
    /// the first non-empty update; later updates must match it.
    pub fn update_x_features(&mut self, x_features: Array2<f64>) {
        if x_features.nrows() == 0 {
            return;
        }
        match self.num_x_features {
            None => self.num_x_features = Some(x_features.ncols()),
            Some(width) => assert_eq!(
                width,
                x_features.ncols(),
                "x_features width diverged from the first update"
            ),
        }
        self.x_features.concat(x_features);
    }

    /// Appends per-example auxiliary feature rows, row-aligned to example
    /// index.
    pub fn update_y_features(&mut self, y_features: Array2<f64>) {
        if y_features.nrows() == 0 {
            return;
        }
        match self.num_y_features {
            None => self.num_y_features = Some(y_features.ncols()),
            Some(width) => assert_eq!(
                width,
                y_features.ncols(),
                "y_features width diverged from the first update"
            ),
        }
        self.y_features.concat(y_features);
    }

    /// Appends per-example label rows.
    pub fn update_ys(&mut self, ys: Array2<f64>) {
        if ys.nrows() == 0 {
            return;
        }
        match self.num_classes {
            None => self.num_classes = Some(ys.ncols()),
            Some(classes) => assert_eq!(
                classes,
                ys.ncols(),
                "label width diverged from the first update"
            ),
        }
        self.ys.concat(ys);
    }

    /// Replaces `x_features` with the result of a caller-supplied transform
    /// over the full current state. The returned table must preserve the
    /// original shape exactly; any change is a contract violation.
    pub fn dynamic_update_x_features<F>(&mut self, update_func: F)
    where
        F: FnOnce(&[Vec<Vec<Triple>>], &[Vec<usize>], &Array2<f64>, Option<&Array2<f64>>) -> Array2<f64>,
    {
        let current = self
            .x_features
            .as_array()
            .expect("x_features must be populated before a dynamic update");
        let replacement = update_func(
            &self.edge_lists,
            &self.selected_node_indices,
            current,
            self.y_features.as_array(),
        );
        assert_eq!(
            replacement.dim(),
            current.dim(),
            "dynamic x_features update must preserve shape"
        );
        self.x_features = FeatureTable::from(replacement);
    }

    // Persistence

    /// Partitions the example axis and the `x_features` row axis into
    /// `num_subfiles` contiguous ceiling-division chunks and serializes each
    /// chunk as a fresh container to `<path>/<name_prefix>_<i>.bin`,
    /// writing through a temporary path.
    pub fn dump(&self, name_prefix: &str, num_subfiles: usize) -> Result<(), CascadeError> {
        assert!(num_subfiles > 0, "num_subfiles must be positive");
        assert!(!self.edge_lists.is_empty(), "nothing to dump");
        let num_examples = self.len();
        let info_chunk = num_examples.div_ceil(num_subfiles);
        let x_chunk = self.x_features.num_rows().div_ceil(num_subfiles);

        for i in 0..num_subfiles {
            let info_start = (i * info_chunk).min(num_examples);
            let info_end = ((i + 1) * info_chunk).min(num_examples);
            let (x_start, x_end) = (i * x_chunk, (i + 1) * x_chunk);

            let mut shard = ActionDataset::new(
                &self.path,
                self.actions.clone(),
                self.is_coo_repr,
                self.is_x_indices_repr,
            )?;
            shard.update_matrix_lists(
                self.edge_lists[info_start..info_end].to_vec(),
                self.selected_node_indices[info_start..info_end].to_vec(),
            );
            shard.update_x_features(self.x_features.slice_rows(x_start, x_end));
            shard.update_y_features(self.y_features.slice_rows(info_start, info_end));
            shard.update_ys(self.ys.slice_rows(info_start, info_end));

            let path = self.path.join(format!("{name_prefix}_{i}.{SHARD_EXT}"));
            let bytes = bincode::serialize(&shard)?;
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
        }
        tracing::info!("Dump: {name_prefix} with {num_subfiles} shards");
        Ok(())
    }

    /// Loads every shard in the container directory whose name starts with
    /// `name_prefix` and carries the shard extension, accumulating their
    /// fields in sorted-name order. Returns `false` when no shard matches or
    /// when any matching shard fails to deserialize (fields accumulated from
    /// earlier shards are retained); `true` on full success.
    pub fn load(&mut self, name_prefix: &str) -> bool {
        let suffix = format!(".{SHARD_EXT}");
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!("Load Failed: cannot list {}: {err}", self.path.display());
                return false;
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(name_prefix) && name.ends_with(&suffix))
            .collect();
        names.sort();

        if names.is_empty() {
            tracing::debug!("No shard matches prefix {name_prefix}");
            return false;
        }
        for name in &names {
            if !self.load_shard(name) {
                tracing::error!("Load Failed in Loading {names:?}");
                return false;
            }
        }
        tracing::info!("Loaded: {names:?}");
        true
    }

    fn load_shard(&mut self, name: &str) -> bool {
        let path = self.path.join(name);
        let loaded: ActionDataset = match fs::read(&path)
            .map_err(CascadeError::from)
            .and_then(|bytes| bincode::deserialize(&bytes).map_err(CascadeError::from))
        {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::error!("Load Failed: {}\n\t{err}", path.display());
                return false;
            }
        };
        self.update_matrix_lists(loaded.edge_lists, loaded.selected_node_indices);
        if let Some(x) = loaded.x_features.0 {
            self.update_x_features(x);
        }
        if let Some(y) = loaded.y_features.0 {
            self.update_y_features(y);
        }
        if let Some(ys) = loaded.ys.0 {
            self.update_ys(ys);
        }
        true
    }
}
