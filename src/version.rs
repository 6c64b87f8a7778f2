//! Class-file version listing (`sig-sniffer versions`).

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::classfile::read_version;
use crate::walker::UnitWalker;

const FIRST_LABELLED_MAJOR: u16 = 45;
const LAST_LABELLED_MAJOR: u16 = 69;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl ClassVersion {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// `Java1` for 45.x through `Java25` for 69.0. Other versions have no
    /// label and are shown numerically.
    pub fn human_label(&self) -> Option<String> {
        let labelled = (FIRST_LABELLED_MAJOR..=LAST_LABELLED_MAJOR).contains(&self.major)
            && (self.minor == 0 || self.major == FIRST_LABELLED_MAJOR);
        labelled.then(|| format!("Java{}", self.major - FIRST_LABELLED_MAJOR + 1))
    }
}

impl fmt::Display for ClassVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid class version `{0}` (expected e.g. `52.0`, `52` or `Java8`)")]
pub struct InvalidVersion(String);

impl FromStr for ClassVersion {
    type Err = InvalidVersion;

    /// Accepts `major.minor`, a bare `major`, or a label such as `Java8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersion(s.to_string());
        let trimmed = s.trim();

        if let Some(release) = trimmed
            .strip_prefix("Java")
            .or_else(|| trimmed.strip_prefix("java"))
        {
            let release: u16 = release.parse().map_err(|_| invalid())?;
            if release == 0 || release > LAST_LABELLED_MAJOR - FIRST_LABELLED_MAJOR + 1 {
                return Err(invalid());
            }
            return Ok(Self::new(release + FIRST_LABELLED_MAJOR - 1, 0));
        }

        let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
        Ok(Self::new(
            major.parse().map_err(|_| invalid())?,
            minor.parse().map_err(|_| invalid())?,
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    pub units: usize,
    pub highest: Option<ClassVersion>,
}

impl VersionReport {
    /// True when some unit was compiled for a newer version than `threshold`.
    pub fn exceeds(&self, threshold: ClassVersion) -> bool {
        self.highest.is_some_and(|highest| highest > threshold)
    }
}

/// Prints `version name` for every compiled unit under `paths`.
pub fn report_versions<W: Write>(paths: &[PathBuf], human: bool, out: &mut W) -> Result<VersionReport> {
    let mut report = VersionReport::default();
    for unit in UnitWalker::new(paths) {
        let unit = unit?;
        let version = read_version(&unit.bytes)
            .with_context(|| format!("Failed to read class version: {}", unit.name))?;

        let shown = match human.then(|| version.human_label()).flatten() {
            Some(label) => label,
            None => version.to_string(),
        };
        writeln!(out, "{shown} {}", unit.name)?;

        report.units += 1;
        report.highest = report.highest.max(Some(version));
    }
    Ok(report)
}
