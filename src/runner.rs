//! Per-run state machine:
//! `START → PRECHECK → CLEAN_OLD → TRANSFER → {COMMIT | ABORT} → END`.
//!
//! Errors leave this module tagged with the [`Phase`] they happened in, as
//! `anyhow` context, so the failure line can name it.

use std::{fmt, path::PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    backup::{retention, TempArtifact},
    config::BackupConfig,
    logging,
    precheck::{self, BackupPlan},
    signal::CancelFlag,
    transfer::{self, TransferStats},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Precheck,
    CleanOld,
    Transfer,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Precheck => "precheck",
            Phase::CleanOld => "clean_old",
            Phase::Transfer => "transfer",
            Phase::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub artifact: PathBuf,
    pub removed: Vec<PathBuf>,
    pub stats: TransferStats,
}

#[derive(Debug, Clone)]
pub struct BackupRunner {
    config: BackupConfig,
    cancel: CancelFlag,
}

impl BackupRunner {
    pub fn new(config: BackupConfig, cancel: CancelFlag) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Validate preconditions for a run dated `today`. Touches nothing in the
    /// backup directory except creating it when missing.
    pub fn precheck(&self, today: NaiveDate) -> Result<BackupPlan> {
        self.cancel.check().context(Phase::Precheck)?;
        let plan = precheck::verify(&self.config, today).context(Phase::Precheck)?;
        self.cancel.check().context(Phase::Precheck)?;
        Ok(plan)
    }

    /// Full run for the local calendar date.
    pub fn run(&self) -> Result<RunOutcome> {
        let plan = self.precheck(Local::now().date_naive())?;
        self.execute(&plan)
    }

    /// CLEAN_OLD, TRANSFER and COMMIT for an already verified plan.
    #[instrument(
        skip_all,
        fields(
            run_id = tracing::field::Empty,
            device = %plan.source.path.display(),
            artifact = %plan.artifact.file_name()
        )
    )]
    pub fn execute(&self, plan: &BackupPlan) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        self.cancel.check().context(Phase::CleanOld)?;
        let removed = retention::remove_previous(&plan.backup_dir, &plan.artifact.device_id)
            .context(Phase::CleanOld)?;
        info!(removed = removed.len(), "previous backups cleaned");

        self.cancel.check().context(Phase::Transfer)?;
        let temp_path = plan.temp_path();
        let (guard, temp_file) = TempArtifact::create(&temp_path).context(Phase::Transfer)?;
        info!(temp = %temp_path.display(), size = plan.source.size, "transfer started");

        let stats = match transfer::execute(
            &plan.source,
            &plan.options,
            temp_file,
            guard.path(),
            &self.cancel,
        ) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "transfer failed; discarding temporary artifact");
                drop(guard);
                return Err(err).context(Phase::Transfer);
            }
        };
        logging::log_transfer_summary(&stats);

        // A signal that lands after the last block still aborts the run.
        self.cancel.check().context(Phase::Commit)?;
        let artifact = guard.commit(&plan.final_path()).context(Phase::Commit)?;
        info!(artifact = %artifact.display(), "backup committed");

        Ok(RunOutcome {
            run_id,
            artifact,
            removed,
            stats,
        })
    }
}
