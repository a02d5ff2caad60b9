//! Artifact naming: `<device-id>_<YYYY-MM-DD>.img.gz` plus its `.tmp` sibling.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use crate::{Error, Result};

pub const ARTIFACT_SUFFIX: &str = ".img.gz";
pub const TEMP_SUFFIX: &str = ".tmp";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier used in artifact names: the last component of the device path.
pub fn device_id(device: &Path) -> Result<String> {
    let id = device
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "cannot derive a device identifier from {}",
                device.display()
            ))
        })?;
    Ok(id.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Final,
    Temp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub device_id: String,
    pub date: NaiveDate,
}

impl ArtifactName {
    pub fn new(device_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            device_id: device_id.into(),
            date,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}{}",
            self.device_id,
            self.date.format(DATE_FORMAT),
            ARTIFACT_SUFFIX
        )
    }

    pub fn temp_file_name(&self) -> String {
        format!("{}{}", self.file_name(), TEMP_SUFFIX)
    }

    pub fn final_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    pub fn temp_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.temp_file_name())
    }

    /// Parse a final or temporary artifact file name.
    pub fn parse(file_name: &str) -> Option<(Self, ArtifactKind)> {
        let (stem, kind) = match file_name.strip_suffix(TEMP_SUFFIX) {
            Some(rest) => (rest.strip_suffix(ARTIFACT_SUFFIX)?, ArtifactKind::Temp),
            None => (
                file_name.strip_suffix(ARTIFACT_SUFFIX)?,
                ArtifactKind::Final,
            ),
        };
        let (device_id, date) = stem.rsplit_once('_')?;
        if device_id.is_empty() {
            return None;
        }
        let date = parse_date(date)?;
        Some((Self::new(device_id, date), kind))
    }

    /// Whether `file_name` is an artifact (of either kind) of `device_id`.
    pub fn matches(file_name: &str, device_id: &str) -> Option<(Self, ArtifactKind)> {
        Self::parse(file_name).filter(|(name, _)| name.device_id == device_id)
    }
}

// chrono accepts unpadded fields; only the exact `YYYY-MM-DD` spelling counts.
fn parse_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT).ok()?;
    (date.format(DATE_FORMAT).to_string() == text).then_some(date)
}
