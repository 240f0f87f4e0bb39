//! Optional tuning settings for the runner, loaded from TOML.
//!
//! Everything has a default; a settings file only needs the keys it wants
//! to change.

use anyhow::{Result, anyhow};
use elements::{DEFAULT_BATCH_SIZE, DEFAULT_BITRATE_KBPS, DEFAULT_CHUNK_SIZE};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunnerSettings {
    #[serde(default)]
    pub io: IoSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub encoder: EncoderSettings,
    #[serde(default)]
    pub links: LinkSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

impl RunnerSettings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read settings file '{}': {}", path.display(), e))?;
        let settings: RunnerSettings = toml::from_str(&content)
            .map_err(|e| anyhow!("failed to parse settings file '{}': {}", path.display(), e))?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IoSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_batch_size")]
    pub size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSettings {
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSettings {
    #[serde(default = "default_link_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_enable_summary")]
    pub enable_summary: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_bitrate_kbps() -> u32 {
    DEFAULT_BITRATE_KBPS
}
fn default_link_capacity() -> usize {
    8
}
fn default_enable_summary() -> bool {
    true
}

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: default_bitrate_kbps(),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            capacity: default_link_capacity(),
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            enable_summary: default_enable_summary(),
        }
    }
}
