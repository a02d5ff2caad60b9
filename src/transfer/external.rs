//! External engine: `dd if=<source> bs=<block> conv=noerror,sync status=none | gzip -c`.
//!
//! The first stage that exits non-zero decides the exit code, `dd` before
//! `gzip`, unless `dd` only died of a broken pipe. A child killed by a signal
//! reports `128 + signo`.

use std::{
    fs::File,
    os::unix::process::ExitStatusExt,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};

use tracing::{debug, info};

use super::{Stage, TransferOptions, TransferStats};
use crate::{precheck::SourceDevice, signal::CancelFlag, Error, Result, EXIT_FAILURE};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Running {
    stage: Stage,
    command: String,
    child: Child,
    status: Option<ExitStatus>,
}

impl Running {
    fn poll(&mut self) -> Result<bool> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status.is_some())
    }

    fn kill(&mut self) {
        if self.status.is_none() {
            let _ = self.child.kill();
            self.status = self.child.wait().ok();
        }
    }

    fn broken_pipe(&self) -> bool {
        self.status.and_then(|s| s.signal()) == Some(libc::SIGPIPE)
    }

    fn failure(&self) -> Option<Error> {
        let status = self.status?;
        if status.success() {
            return None;
        }
        let code = status
            .code()
            .or_else(|| status.signal().map(|sig| 128 + sig))
            .filter(|code| *code != 0)
            .unwrap_or(EXIT_FAILURE);
        Some(Error::StageFailed {
            stage: self.stage,
            code,
            context: self.command.clone(),
        })
    }
}

/// Kill and reap every stage that is still running.
fn kill_all(stages: &mut [Running]) {
    for stage in stages.iter_mut() {
        stage.kill();
    }
}

/// `true` once every stage has exited.
fn poll_all(stages: &mut [Running]) -> Result<bool> {
    let mut done = true;
    for stage in stages.iter_mut() {
        done &= stage.poll()?;
    }
    Ok(done)
}

pub fn dd_args(source: &Path, block_size: usize) -> Vec<String> {
    vec![
        format!("if={}", source.display()),
        format!("bs={block_size}"),
        "conv=noerror,sync".to_string(),
        "status=none".to_string(),
    ]
}

pub fn gzip_args(level: u32) -> Vec<String> {
    vec!["-c".to_string(), format!("-{level}")]
}

fn spawn_error(stage: Stage, command: &str, err: std::io::Error) -> Error {
    Error::StageFailed {
        stage,
        code: EXIT_FAILURE,
        context: format!("{command}: {err}"),
    }
}

/// Copy `source` into the temporary artifact through `dd | gzip` and fsync it.
pub fn transfer_file(
    source: &SourceDevice,
    options: &TransferOptions,
    temp_file: File,
    temp_path: &Path,
    cancel: &CancelFlag,
) -> Result<TransferStats> {
    let dd_args = dd_args(&source.path, options.block_size);
    let gzip_args = gzip_args(options.compression_level);
    let dd_command = format!("dd {}", dd_args.join(" "));
    let gzip_command = format!("gzip {} > {}", gzip_args.join(" "), temp_path.display());

    let mut dd = Command::new("dd")
        .args(&dd_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(Stage::Read, &dd_command, e))?;
    let Some(dd_out) = dd.stdout.take() else {
        let _ = dd.kill();
        let _ = dd.wait();
        let err = std::io::ErrorKind::BrokenPipe.into();
        return Err(spawn_error(Stage::Read, &dd_command, err).into());
    };

    let gzip = match Command::new("gzip")
        .args(&gzip_args)
        .stdin(Stdio::from(dd_out))
        .stdout(Stdio::from(temp_file))
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            let _ = dd.kill();
            let _ = dd.wait();
            return Err(spawn_error(Stage::Compress, &gzip_command, err).into());
        }
    };
    info!(read = %dd_command, compress = %gzip_command, "external pipeline started");

    let mut stages = [
        Running {
            stage: Stage::Read,
            command: dd_command,
            child: dd,
            status: None,
        },
        Running {
            stage: Stage::Compress,
            command: gzip_command,
            child: gzip,
            status: None,
        },
    ];

    loop {
        if cancel.is_cancelled() {
            kill_all(&mut stages);
            return Err(Error::Interrupted.into());
        }
        match poll_all(&mut stages) {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                kill_all(&mut stages);
                return Err(err);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    let [read, compress] = &stages;
    let failure = match (read.failure(), compress.failure()) {
        // dd dying of SIGPIPE is a consequence of gzip going away first.
        (Some(_), Some(err)) if read.broken_pipe() => Some(err),
        (Some(err), _) => Some(err),
        (None, other) => other,
    };
    if let Some(err) = failure {
        return Err(err.into());
    }

    let output = File::open(temp_path)?;
    output.sync_all()?;
    let compressed_bytes = output.metadata()?.len();
    debug!(compressed_bytes, "external pipeline finished");

    Ok(TransferStats {
        bytes_read: source.size,
        compressed_bytes,
        blocks: source.size.div_ceil(options.block_size as u64),
        unreadable_blocks: 0,
    })
}
