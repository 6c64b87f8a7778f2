//! # sig-sniffer
//!
//! Detects use of JVM API members that a target runtime does not have.
//!
//! A signature database records every class, method and field of a
//! baseline (for example a JDK's `rt.jar` or `jmods/`). Compiled code is then
//! checked against it: any referenced class or member that cannot be found,
//! directly or through inheritance, is reported.
//!
//! ## Architecture
//!
//! - **walker**: streams class files out of directories and jar/jmod/zip archives
//! - **classfile**: class-file decoder (shape only, outline, or full with method bodies)
//! - **signature**: per-class signature sets and the database map
//! - **builder**: baseline binaries to signature database
//! - **codec**: gzip-compressed, end-marked database format
//! - **catalog**: classes and marked scopes of the code under check
//! - **checker**: reference resolution with inheritance and suppression rules
//! - **ignore_rules**: ignored package and class-name wildcard rules
//! - **diagnostic**: findings and the sinks that receive them
//! - **merger**: union of several databases
//! - **version**: class-file version listing

pub mod builder;
pub mod catalog;
pub mod checker;
pub mod classfile;
pub mod cli;
pub mod codec;
pub mod config;
pub mod diagnostic;
pub mod ignore_rules;
pub mod logger;
pub mod merger;
pub mod signature;
pub mod version;
pub mod walker;

#[cfg(test)]
#[path = "../tests/common/assembler.rs"]
pub(crate) mod test_assembler;

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use crate::builder::SignatureBuilder;
use crate::checker::SignatureChecker;
use crate::diagnostic::{CollectingSink, Diagnostic};
use crate::ignore_rules::IgnoreRules;

/// Result of [`check`]: `ok` is false when any violation was found.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub ok: bool,
    pub units_scanned: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Builds an encoded signature database from baseline paths.
pub fn build<P: AsRef<Path>>(baseline_paths: &[P]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    SignatureBuilder::new().build_to_writer(baseline_paths, &mut bytes)?;
    Ok(bytes)
}

/// Checks `target_paths` against an encoded database.
pub fn check<P, S>(database: &[u8], target_paths: &[P], ignore: &[S]) -> Result<CheckReport>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let rules = IgnoreRules::new(ignore).context("Invalid ignore pattern")?;
    let checker = SignatureChecker::load(database, rules)?;
    let sink = CollectingSink::new();
    let outcome = checker.scan(target_paths, &sink)?;
    Ok(CheckReport {
        ok: !outcome.violations_found,
        units_scanned: outcome.units_scanned,
        diagnostics: sink.into_diagnostics(),
    })
}

/// Merges encoded databases into one encoded database.
pub fn merge<I, R>(streams: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = R>,
    R: Read,
{
    let mut bytes = Vec::new();
    merger::merge_streams(streams, &mut bytes).context("Failed to merge signature databases")?;
    Ok(bytes)
}
