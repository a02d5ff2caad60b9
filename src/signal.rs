//! SIGINT/SIGTERM handling. The handler only flips a shared flag; every
//! pipeline stage polls it and unwinds through the normal error path, so the
//! temporary artifact guard runs exactly as it does for an I/O failure.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use tracing::warn;

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Interrupted)` once a signal has been received.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Interrupted.into());
        }
        Ok(())
    }
}

static PROCESS_FLAG: OnceLock<CancelFlag> = OnceLock::new();

/// Install the process-wide handler and return its flag. Later calls return
/// the same flag without reinstalling.
pub fn install_handler() -> Result<CancelFlag> {
    let mut installed = Ok(());
    let flag = PROCESS_FLAG
        .get_or_init(|| {
            let flag = CancelFlag::new();
            let handler_flag = flag.clone();
            installed = ctrlc::set_handler(move || {
                warn!("termination signal received; aborting backup");
                handler_flag.cancel();
            });
            flag
        })
        .clone();

    installed.map_err(|e| Error::Cli(format!("failed to install signal handler: {e}")))?;
    Ok(flag)
}
