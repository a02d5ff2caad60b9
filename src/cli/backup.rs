//! Implementation of `rawbak backup`, also what runs with no subcommand.

use anyhow::Context;
use clap::Args;

use super::{status::OutputFormat, GlobalArgs};
use crate::{
    runner::{BackupRunner, Phase, RunOutcome},
    signal, Result,
};

#[derive(Debug, Clone, Args, Default)]
pub struct BackupArgs {
    /// Format of the summary printed after a successful run.
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn execute(global: &GlobalArgs, args: BackupArgs) -> Result<()> {
    let config = global.resolve_config().context(Phase::Precheck)?;
    let cancel = signal::install_handler()?;

    let outcome = BackupRunner::new(config, cancel).run()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print!("{}", format_text(&outcome)),
    }
    Ok(())
}

pub fn format_text(outcome: &RunOutcome) -> String {
    let mut out = format!("backup complete: {}\n", outcome.artifact.display());
    for path in &outcome.removed {
        out.push_str(&format!("removed: {}\n", path.display()));
    }
    out.push_str(&format!(
        "bytes_read={} compressed_bytes={} unreadable_blocks={}\n",
        outcome.stats.bytes_read, outcome.stats.compressed_bytes, outcome.stats.unreadable_blocks
    ));
    out
}
