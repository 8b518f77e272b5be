//! Default values for flags the CLI lets the user skip, loaded from
//! `~/.config/ftpdl/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Defaults for a download. Every field here has a corresponding CLI flag
/// that overrides it; this is only consulted for flags the user omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpdlConfig {
    pub connections: usize,
    pub min_blocks_per_segment: usize,
    pub max_blocks_per_segment: usize,
    pub blocksize: u64,
    pub kill_speed: f64,
}

impl Default for FtpdlConfig {
    fn default() -> Self {
        Self {
            connections: 4,
            min_blocks_per_segment: 8,
            max_blocks_per_segment: 128,
            blocksize: 1024 * 1024,
            kill_speed: 1.0,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ftpdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Loads configuration from disk, writing a default file if none exists yet.
pub fn load_or_init() -> Result<FtpdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FtpdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: FtpdlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
