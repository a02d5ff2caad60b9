//! Logging initialization using `tracing` and `tracing-subscriber`.
//!
//! Progress and status go to stdout; warnings and errors go to stderr.

use chrono::{DateTime, Local, SecondsFormat};
use clap::ValueEnum;
use tracing::{info, warn, Level};
use tracing_subscriber::{
    fmt::{self, writer::MakeWriterExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{runner::Phase, transfer::TransferStats, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Initialize global tracing subscriber. Safe to call multiple times; subsequent
/// calls will no-op.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    };

    Ok(())
}

/// The single diagnostic line printed to stderr when a run fails:
/// timestamp, exit code, the phase that failed and the error chain.
pub fn failure_line(err: &anyhow::Error, now: DateTime<Local>) -> String {
    let code = crate::exit_code(err);
    let phase = err.downcast_ref::<Phase>().copied();
    let phase_label = phase.map(|p| p.to_string());

    let message = err
        .chain()
        .map(|cause| cause.to_string())
        .filter(|text| Some(text) != phase_label.as_ref())
        .collect::<Vec<_>>()
        .join(": ");

    format!(
        "[{}] ERROR: exit code {} at {}: {}",
        now.to_rfc3339_opts(SecondsFormat::Secs, false),
        code,
        phase_label.as_deref().unwrap_or("startup"),
        message
    )
}

/// Emit read progress; callers throttle to a handful of lines per run.
pub fn log_transfer_progress(bytes_read: u64, total: u64, unreadable_blocks: u64) {
    let percent = if total == 0 {
        100
    } else {
        bytes_read.saturating_mul(100) / total
    };
    if unreadable_blocks > 0 {
        warn!(
            bytes_read,
            total, percent, unreadable_blocks, "transfer_progress"
        );
    } else {
        info!(bytes_read, total, percent, "transfer_progress");
    }
}

pub fn log_transfer_summary(stats: &TransferStats) {
    info!(
        bytes_read = stats.bytes_read,
        compressed_bytes = stats.compressed_bytes,
        blocks = stats.blocks,
        unreadable_blocks = stats.unreadable_blocks,
        "transfer_complete"
    );
}
