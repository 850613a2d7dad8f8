use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
};

use crate::error::CascadeError;

/// Parameters of one dataset-generation run, persisted as the `[run]` table
/// of a TOML file so repeated runs stay reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory that receives engine snapshots and dataset shards.
    pub data_dir: PathBuf,
    /// Seed for root sampling and diffusion.
    pub seed: u64,
    pub num_info: usize,
    pub propagation_prob: f64,
    /// Shard count for [crate::dataset::ActionDataset::dump].
    pub num_subfiles: usize,
    /// Batch size for training iteration; zero means one full batch.
    pub batch_size: usize,
    pub train_ratio: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            data_dir: PathBuf::from("./data"),
            seed: 42,
            num_info: 1,
            propagation_prob: 0.1,
            num_subfiles: 1,
            batch_size: 0,
            train_ratio: 0.8,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigStore { path }
    }

    pub fn get_run(&self) -> Result<RunConfig, CascadeError> {
        tracing::debug!("Attempting to read run config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, returning defaults.");
            return Ok(RunConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let config: BTreeMap<String, RunConfig> = toml::from_str(&content)?;
        config
            .get("run")
            .cloned()
            .ok_or_else(|| CascadeError::NotFound("run not found in config".to_string()))
    }

    pub fn set_run(&self, run: RunConfig) -> Result<(), CascadeError> {
        tracing::debug!("Attempting to write run config to: {:?}", &self.path);
        let mut config = BTreeMap::new();
        config.insert("run".to_string(), run);
        let toml_string = toml::to_string(&config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = TomlConfigStore::new(dir.path().join("cascade.toml"));

        // Missing file falls back to defaults.
        assert_eq!(store.get_run().unwrap(), RunConfig::default());

        let run = RunConfig {
            data_dir: dir.path().join("data"),
            seed: 7,
            num_info: 3,
            propagation_prob: 0.25,
            num_subfiles: 4,
            batch_size: 16,
            train_ratio: 0.75,
        };
        store.set_run(run.clone()).unwrap();
        assert_eq!(store.get_run().unwrap(), run);
    }

    #[test]
    fn test_missing_run_table_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cascade.toml");
        std::fs::write(&path, "[other]\nseed = 1\n").unwrap();
        let store = TomlConfigStore::new(path);
        assert!(store.get_run().is_err());
    }
}
