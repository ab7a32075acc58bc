//!
//! 配置模块
//!

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Parallel connections per download.
    pub connections: usize,
    /// Root of the per-url working directories holding parts and checkpoints.
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub user_agent: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn load_from_file(file_path: &Path) -> Result<Self> {
        let config_data = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config {}", file_path.display()))?;
        let config: Config = serde_json::from_str(&config_data)
            .with_context(|| format!("Invalid config {}", file_path.display()))?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(".rangefetch");

        Self {
            connections: 4,
            data_dir,
            output_dir: PathBuf::from("."),
            user_agent: format!("rangefetch/{}", env!("CARGO_PKG_VERSION")),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}
