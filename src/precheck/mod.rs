//! Preconditions checked before the backup directory is touched.
//!
//! Every failure here maps to exit code 1 and leaves the destination as it
//! was, apart from creating a missing backup directory.

use std::{
    ffi::CString,
    fs::{self, File},
    io::{self, Seek, SeekFrom},
    os::unix::{ffi::OsStrExt, fs::FileTypeExt},
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::{
    backup::ArtifactName,
    config::{BackupConfig, Engine},
    transfer::TransferOptions,
    Error, Result,
};

/// Tools the external engine shells out to.
pub const EXTERNAL_TOOLS: &[&str] = &["dd", "gzip"];

const WRITE_PROBE: &str = ".rawbak_write_test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDevice {
    pub path: PathBuf,
    pub size: u64,
}

impl SourceDevice {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Validate that `path` is an existing block device and measure it.
    pub fn probe(path: &Path) -> Result<Self> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::SourceNotFound(path.display().to_string()).into())
            }
            Err(err) => return Err(err.into()),
        };
        if !meta.file_type().is_block_device() {
            return Err(Error::NotBlockDevice(path.display().to_string()).into());
        }
        Ok(Self::new(path, source_size(path)?))
    }
}

/// Size in bytes of a block device or regular file, found by seeking to its end.
pub fn source_size(path: &Path) -> Result<u64> {
    let mut file = File::open(path)?;
    Ok(file.seek(SeekFrom::End(0))?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceReport {
    pub required: u64,
    pub available: Option<u64>,
}

/// Everything the runner needs once preconditions hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub source: SourceDevice,
    pub backup_dir: PathBuf,
    pub artifact: ArtifactName,
    pub options: TransferOptions,
    pub space: SpaceReport,
}

impl BackupPlan {
    pub fn new(
        source: SourceDevice,
        backup_dir: impl Into<PathBuf>,
        artifact: ArtifactName,
        options: TransferOptions,
    ) -> Self {
        Self {
            source,
            backup_dir: backup_dir.into(),
            artifact,
            options,
            space: SpaceReport::default(),
        }
    }

    pub fn final_path(&self) -> PathBuf {
        self.artifact.final_path(&self.backup_dir)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.artifact.temp_path(&self.backup_dir)
    }
}

/// Run all preconditions in order and produce the plan for `today`.
pub fn verify(config: &BackupConfig, today: NaiveDate) -> Result<BackupPlan> {
    config.validate()?;
    ensure_root(config.require_root)?;
    ensure_tools(config.engine)?;

    let source = SourceDevice::probe(&config.device)?;
    info!(device = %source.path.display(), size = source.size, "source device validated");

    let backup_dir = prepare_backup_dir(&config.backup_dir)?;
    let space = check_free_space(&backup_dir, source.size, config.space_margin_percent)?;

    let artifact = ArtifactName::new(config.device_id()?, today);
    let mut plan = BackupPlan::new(source, backup_dir, artifact, TransferOptions::from(config));
    plan.space = space;
    Ok(plan)
}

pub fn ensure_root(required: bool) -> Result<()> {
    let euid = unsafe { libc::geteuid() };
    if required && euid != 0 {
        return Err(Error::NotRoot(euid).into());
    }
    Ok(())
}

pub fn required_tools(engine: Engine) -> &'static [&'static str] {
    match engine {
        Engine::Native => &[],
        Engine::External => EXTERNAL_TOOLS,
    }
}

pub fn ensure_tools(engine: Engine) -> Result<()> {
    for tool in required_tools(engine) {
        if which::which(tool).is_err() {
            return Err(Error::MissingTool((*tool).to_string()).into());
        }
    }
    Ok(())
}

/// Create the backup directory if needed and verify it accepts writes.
pub fn prepare_backup_dir(path: &Path) -> Result<PathBuf> {
    let not_writable = || Error::BackupDirNotWritable(path.display().to_string());

    if !path.exists() {
        fs::create_dir_all(path).map_err(|_| not_writable())?;
        info!(dir = %path.display(), "created backup directory");
    }
    if !path.is_dir() || !is_writable(path) {
        return Err(not_writable().into());
    }
    Ok(path.to_path_buf())
}

fn is_writable(path: &Path) -> bool {
    let probe = path.join(WRITE_PROBE);
    match fs::write(&probe, b"rawbak") {
        Ok(_) => fs::remove_file(probe).is_ok(),
        Err(_) => false,
    }
}

/// Bytes needed for an image of `source_size`: size plus `margin_percent`, rounded up.
pub fn required_space(source_size: u64, margin_percent: u64) -> u64 {
    let scaled = u128::from(source_size) * u128::from(100 + margin_percent);
    u64::try_from(scaled.div_ceil(100)).unwrap_or(u64::MAX)
}

/// `available >= source_size * (1 + margin)`, compared exactly in integers.
pub fn has_enough_space(source_size: u64, available: u64, margin_percent: u64) -> bool {
    u128::from(available) * 100 >= u128::from(source_size) * u128::from(100 + margin_percent)
}

/// Free bytes available to unprivileged writers on the filesystem holding `path`.
pub fn available_space(path: &Path) -> io::Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(u64::from(stat.f_bavail).saturating_mul(u64::from(stat.f_frsize)))
}

/// Best-effort space check: refuses only when the free space is known and short.
pub fn check_free_space(dir: &Path, source_size: u64, margin_percent: u64) -> Result<SpaceReport> {
    let required = required_space(source_size, margin_percent);
    let available = match available_space(dir) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "could not determine free space; continuing");
            return Ok(SpaceReport {
                required,
                available: None,
            });
        }
    };

    if !has_enough_space(source_size, available, margin_percent) {
        return Err(Error::InsufficientSpace {
            dir: dir.display().to_string(),
            required,
            available,
        }
        .into());
    }
    info!(required, available, "free space check passed");
    Ok(SpaceReport {
        required,
        available: Some(available),
    })
}
