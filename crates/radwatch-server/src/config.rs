//! Server configuration

use radwatch_classifiers::ClassifierConfig;
use radwatch_ops::{StoreSettings, TrainingSettings, UploadSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted chunk request body, in bytes
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// Seconds between retention sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds a finished batch progress record stays in memory
    #[serde(default = "default_batch_retention")]
    pub batch_retention_secs: u64,

    /// Models, ensemble and threshold
    #[serde(default)]
    pub classifiers: ClassifierConfig,

    #[serde(default)]
    pub uploads: UploadSettings,

    #[serde(default)]
    pub training: TrainingSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl ServerConfig {
    /// Load configuration from file, or use defaults when it does not exist
    pub fn load(config_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = config_path.as_ref();
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };
        config.classifiers.validate()?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            max_chunk_bytes: default_max_chunk_bytes(),
            sweep_interval_secs: default_sweep_interval(),
            batch_retention_secs: default_batch_retention(),
            classifiers: ClassifierConfig::default(),
            uploads: UploadSettings::default(),
            training: TrainingSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_chunk_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_batch_retention() -> u64 {
    3600
}
