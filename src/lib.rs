use std::sync::OnceLock;

use parking_lot::ReentrantMutex;
use thiserror::Error;

pub mod backup;
pub mod cli;
pub mod config;
pub mod logging;
pub mod precheck;
pub mod runner;
pub mod signal;
pub mod transfer;

pub type Result<T> = anyhow::Result<T>;

/// Exit code for precondition, configuration and in-process stage failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code after SIGINT/SIGTERM (128 + SIGINT, as a shell reports it).
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Error, Debug)]
pub enum Error {
    #[error("must be run as root (effective uid {0})")]
    NotRoot(u32),
    #[error("required tool not found on PATH: {0}")]
    MissingTool(String),
    #[error("source device not found: {0}")]
    SourceNotFound(String),
    #[error("source is not a block device: {0}")]
    NotBlockDevice(String),
    #[error("backup directory not writable: {0}")]
    BackupDirNotWritable(String),
    #[error("insufficient space in {dir}: need {required} bytes, {available} available")]
    InsufficientSpace {
        dir: String,
        required: u64,
        available: u64,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{stage} stage failed with exit code {code}: {context}")]
    StageFailed {
        stage: transfer::Stage,
        code: i32,
        context: String,
    },
    #[error("interrupted by signal")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cli error: {0}")]
    Cli(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::StageFailed { code, .. } if *code != 0 => *code,
            Error::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }

    /// Precondition failures never touch the backup directory.
    pub fn is_precheck(&self) -> bool {
        matches!(
            self,
            Error::NotRoot(_)
                | Error::MissingTool(_)
                | Error::SourceNotFound(_)
                | Error::NotBlockDevice(_)
                | Error::BackupDirNotWritable(_)
                | Error::InsufficientSpace { .. }
                | Error::Config(_)
        )
    }
}

/// Process exit code for an error returned by [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .unwrap_or(EXIT_FAILURE)
}

/// Serializes environment overrides (`PATH`, `RAWBAK_*`) across parallel tests.
#[doc(hidden)]
pub fn env_lock() -> &'static ReentrantMutex<()> {
    static LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;
    logging::init_logging(cli_args.log_format)?;
    cli::dispatch(cli_args)
}
