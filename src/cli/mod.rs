//! Command-line surface. Without a subcommand the binary runs a backup with
//! the compiled-in configuration.

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::{
    config::{self, BackupConfig, Engine, Overrides},
    logging::LogFormat,
    Result,
};

pub mod backup;
pub mod check;
pub mod status;

#[derive(Debug, Clone)]
pub enum Command {
    Backup(backup::BackupArgs),
    Check(check::CheckArgs),
    Status(status::StatusArgs),
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
    pub global: GlobalArgs,
    pub log_format: LogFormat,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            command: Command::Backup(backup::BackupArgs::default()),
            global: GlobalArgs::default(),
            log_format: LogFormat::Human,
        }
    }
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Optional TOML config file layered over the built-in defaults
    #[arg(long = "config", env = "RAWBAK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Block device to back up
    #[arg(long = "device", env = "RAWBAK_DEVICE", global = true)]
    pub device: Option<PathBuf>,

    /// Directory holding the single retained image
    #[arg(long = "backup-dir", env = "RAWBAK_BACKUP_DIR", global = true)]
    pub backup_dir: Option<PathBuf>,

    /// Copy engine: in-process, or `dd | gzip`
    #[arg(long = "engine", value_enum, global = true)]
    pub engine: Option<Engine>,
}

impl GlobalArgs {
    pub fn resolve_config(&self) -> Result<BackupConfig> {
        let overrides = Overrides {
            device: self.device.clone(),
            backup_dir: self.backup_dir.clone(),
            engine: self.engine,
        };
        config::resolve(self.config.as_deref(), &overrides)
    }
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Backup(b) => backup::execute(&args.global, b),
        Command::Check(c) => check::execute(&args.global, c),
        Command::Status(s) => status::execute(&args.global, s),
    }
}

#[derive(Parser, Debug)]
#[command(name = "rawbak", version, about = "Crash-safe gzip image backup of a block device")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value = "human", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand, Debug)]
enum Subcommands {
    /// Image the device into the backup directory (the default).
    Backup(backup::BackupArgs),
    /// Run the preconditions only and print the plan; changes nothing.
    Check(check::CheckArgs),
    /// Show the retained image and any stale temporary file.
    Status(status::StatusArgs),
}

/// Parse CLI arguments into internal representation.
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = Cli::parse_from(argv);
    let command = match cli.command {
        Some(Subcommands::Backup(args)) => Command::Backup(args),
        Some(Subcommands::Check(args)) => Command::Check(args),
        Some(Subcommands::Status(args)) => Command::Status(args),
        None => Command::Backup(backup::BackupArgs::default()),
    };

    Ok(CliArgs {
        command,
        global: cli.global,
        log_format: cli.log_format,
    })
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}
