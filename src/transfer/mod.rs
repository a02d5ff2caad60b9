//! The read → compress → temp-file pipeline.
//!
//! Both engines produce a gzip image of the whole source in the temporary
//! artifact and fsync it. They differ in who does the work: the native engine
//! runs a reader thread and a gzip encoder in-process, the external engine
//! pipes `dd` into `gzip`.

use std::{fmt, fs::File, path::Path};

use serde::Serialize;

use crate::{
    config::{BackupConfig, Engine},
    precheck::SourceDevice,
    signal::CancelFlag,
    Result,
};

pub mod external;
pub mod native;

pub use native::{BlockReader, ReadAt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Compress,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Read => f.write_str("read"),
            Stage::Compress => f.write_str("compress"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub engine: Engine,
    pub block_size: usize,
    pub compression_level: u32,
    pub channel_depth: usize,
}

impl From<&BackupConfig> for TransferOptions {
    fn from(config: &BackupConfig) -> Self {
        Self {
            engine: config.engine,
            block_size: config.block_size,
            compression_level: config.compression_level,
            channel_depth: config.channel_depth,
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from(&BackupConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TransferStats {
    pub bytes_read: u64,
    pub compressed_bytes: u64,
    pub blocks: u64,
    /// Blocks replaced with zeros after a read error. Always 0 for the
    /// external engine, which does not report them.
    pub unreadable_blocks: u64,
}

/// Stream `source` into `temp_file` (already created at `temp_path`).
pub fn execute(
    source: &SourceDevice,
    options: &TransferOptions,
    temp_file: File,
    temp_path: &Path,
    cancel: &CancelFlag,
) -> Result<TransferStats> {
    match options.engine {
        Engine::Native => native::transfer_file(source, options, temp_file, cancel),
        Engine::External => {
            external::transfer_file(source, options, temp_file, temp_path, cancel)
        }
    }
}
