//! Implementation of `rawbak status` subcommand.

use clap::{Args, ValueEnum};

use super::GlobalArgs;
use crate::{
    backup::{list_artifacts, ArtifactEntry, ArtifactKind},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Args, Default)]
pub struct StatusArgs {
    /// Output format.
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn execute(global: &GlobalArgs, args: StatusArgs) -> Result<()> {
    let config = global.resolve_config()?;
    let entries = collect(&config.backup_dir, &config.device_id()?)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => print!("{}", format_text(&entries)),
    }
    Ok(())
}

/// Artifacts for the device; a missing backup directory simply has none.
pub fn collect(dir: &std::path::Path, device_id: &str) -> Result<Vec<ArtifactEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    list_artifacts(dir, device_id)
}

pub fn format_text(entries: &[ArtifactEntry]) -> String {
    if entries.is_empty() {
        return "no backups\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let label = match entry.kind {
            ArtifactKind::Final => "backup",
            ArtifactKind::Temp => "stale-temp",
        };
        out.push_str(&format!(
            "{label}\t{}\t{}\t{}\n",
            entry.date,
            entry.size_bytes,
            entry.path.display()
        ));
    }
    out
}
