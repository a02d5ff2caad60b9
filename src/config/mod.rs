//! Backup configuration.
//!
//! Resolution order, highest first: CLI flag / environment variable, the
//! optional TOML file, then the compiled-in defaults below. Running the binary
//! with no arguments uses the defaults only.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{backup::artifact, Error, Result};

pub const DEFAULT_DEVICE: &str = "/dev/mmcblk0";
pub const DEFAULT_BACKUP_DIR: &str = "/mnt/backup";
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
pub const DEFAULT_SPACE_MARGIN_PERCENT: u64 = 10;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_CHANNEL_DEPTH: usize = 16;

/// Sector granularity every block size must respect.
const SECTOR_SIZE: usize = 512;

/// How the read → compress pipeline is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// In-process reader thread feeding a gzip encoder.
    #[default]
    Native,
    /// `dd conv=noerror,sync | gzip -c` child processes.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub device: PathBuf,
    pub backup_dir: PathBuf,
    pub engine: Engine,
    pub block_size: usize,
    pub space_margin_percent: u64,
    pub compression_level: u32,
    pub channel_depth: usize,
    pub require_root: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            engine: Engine::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            space_margin_percent: DEFAULT_SPACE_MARGIN_PERCENT,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            channel_depth: DEFAULT_CHANNEL_DEPTH,
            require_root: true,
        }
    }
}

/// On-disk shape of the optional config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub device: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub engine: Option<Engine>,
    pub block_size: Option<usize>,
    pub space_margin_percent: Option<u64>,
    pub compression_level: Option<u32>,
    pub channel_depth: Option<usize>,
    pub require_root: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())).into())
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Values that take precedence over the config file (CLI flags or env).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub device: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub engine: Option<Engine>,
}

impl BackupConfig {
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.device {
            self.device = v;
        }
        if let Some(v) = file.backup_dir {
            self.backup_dir = v;
        }
        if let Some(v) = file.engine {
            self.engine = v;
        }
        if let Some(v) = file.block_size {
            self.block_size = v;
        }
        if let Some(v) = file.space_margin_percent {
            self.space_margin_percent = v;
        }
        if let Some(v) = file.compression_level {
            self.compression_level = v;
        }
        if let Some(v) = file.channel_depth {
            self.channel_depth = v;
        }
        if let Some(v) = file.require_root {
            self.require_root = v;
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(v) = &overrides.device {
            self.device = v.clone();
        }
        if let Some(v) = &overrides.backup_dir {
            self.backup_dir = v.clone();
        }
        if let Some(v) = overrides.engine {
            self.engine = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % SECTOR_SIZE != 0 {
            return Err(Error::Config(format!(
                "block_size must be a non-zero multiple of {SECTOR_SIZE}, got {}",
                self.block_size
            ))
            .into());
        }
        if !(1..=9).contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level must be within 1..=9, got {}",
                self.compression_level
            ))
            .into());
        }
        if self.channel_depth == 0 {
            return Err(Error::Config("channel_depth must be at least 1".into()).into());
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(Error::Config("backup_dir must not be empty".into()).into());
        }
        artifact::device_id(&self.device)?;
        Ok(())
    }

    pub fn device_id(&self) -> Result<String> {
        artifact::device_id(&self.device)
    }
}

/// Build the effective configuration from defaults, an optional file and overrides.
pub fn resolve(config_path: Option<&Path>, overrides: &Overrides) -> Result<BackupConfig> {
    let mut config = BackupConfig::default();
    if let Some(path) = config_path {
        config.apply_file(ConfigFile::load(path)?);
    }
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}
