// src/config.rs

use crate::types::Config;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::warn;

impl Config {
    /// Load from a YAML file, falling back to defaults when the file is
    /// missing. `FRAMES_DIR` / `VIOLATIONS_DIR` environment variables
    /// override the artifact directories in either case.
    pub fn load(path: &str) -> Result<Self> {
        let mut config: Config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        } else {
            warn!("Config file {} not found, using defaults", path);
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FRAMES_DIR") {
            self.broadcast.frames_dir = dir;
        }
        if let Ok(dir) = std::env::var("VIOLATIONS_DIR") {
            self.evidence.violations_dir = dir;
        }
    }
}
