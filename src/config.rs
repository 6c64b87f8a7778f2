use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::classfile::SuppressionMarkers;

pub const SIGNATURE_ENV: &str = "SIG_SNIFFER_SIGNATURE";
pub const IGNORE_ENV: &str = "SIG_SNIFFER_IGNORE";

pub fn resolve_signature_path(flag: Option<&Path>) -> Result<PathBuf> {
    pick_signature_path(flag, env::var_os(SIGNATURE_ENV))
}

fn pick_signature_path(flag: Option<&Path>, from_env: Option<OsString>) -> Result<PathBuf> {
    if let Some(p) = flag {
        return Ok(p.to_path_buf());
    }
    from_env
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .with_context(|| format!("No signature database given (use --signature or set {SIGNATURE_ENV})"))
}

/// Ignore entries from `--ignore`, then the ignore file, then the
/// environment.
pub fn resolve_ignore_list(flags: &[String], ignore_file: Option<&Path>) -> Result<Vec<String>> {
    let from_env = env::var(IGNORE_ENV).ok();
    let mut entries = flags.to_vec();
    if let Some(path) = ignore_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ignore file: {}", path.display()))?;
        entries.extend(parse_ignore_file(&content));
    }
    if let Some(value) = from_env {
        entries.extend(split_env_list(&value));
    }
    Ok(entries)
}

/// One entry per line; blank lines and `#` comments are skipped.
pub fn parse_ignore_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(entry, _)| entry).trim())
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_env_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn resolve_markers(annotations: &[String]) -> SuppressionMarkers {
    if annotations.is_empty() {
        SuppressionMarkers::default()
    } else {
        SuppressionMarkers::from_type_names(annotations)
    }
}

/// Writes `bytes` to a `.tmp` sibling, then renames it over `path`.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp_os = path.as_os_str().to_os_string();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("Failed to write file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| {
        format!(
            "Failed to move {} into place at {}",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}
