//! Builds a signature database from baseline binaries.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::classfile::{DecodeMode, decode};
use crate::codec::write_database;
use crate::diagnostic::{Diagnostic, DiagnosticSink, Severity, TracingSink};
use crate::ignore_rules::ClassFilter;
use crate::merger::merge;
use crate::signature::{Database, SignatureSet};
use crate::walker::UnitWalker;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no classes found in the baseline; no signature database written")]
    EmptyBaseline,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub classes_found: usize,
    pub classes_written: usize,
    pub sha256: String,
}

pub struct SignatureBuilder {
    bases: Vec<Database>,
    include: ClassFilter,
    exclude: ClassFilter,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self {
            bases: Vec::new(),
            include: ClassFilter::default(),
            exclude: ClassFilter::default(),
            sink: Arc::new(TracingSink),
        }
    }
}

impl SignatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extends an existing database; classes found by the build are merged
    /// into it and win on hierarchy.
    pub fn with_base(mut self, base: Database) -> Self {
        self.bases.push(base);
        self
    }

    /// Keeps only classes matching one of the patterns. Empty keeps all.
    pub fn include(mut self, filter: ClassFilter) -> Self {
        self.include = filter;
        self
    }

    pub fn exclude(mut self, filter: ClassFilter) -> Self {
        self.exclude = filter;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Database> {
        self.build_counted(paths).map(|(db, _)| db)
    }

    /// Builds and writes the database, returning what was written.
    pub fn build_to_writer<P, W>(&self, paths: &[P], mut writer: W) -> Result<BuildReport>
    where
        P: AsRef<Path>,
        W: Write,
    {
        let (db, classes_found) = self.build_counted(paths)?;

        let mut bytes = Vec::new();
        write_database(&mut bytes, &db).context("Failed to encode signature database")?;
        writer
            .write_all(&bytes)
            .context("Failed to write signature database")?;
        writer.flush()?;

        tracing::info!(classes = db.len(), "wrote signatures");
        Ok(BuildReport {
            classes_found,
            classes_written: db.len(),
            sha256: hash_content(&bytes),
        })
    }

    fn build_counted<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(Database, usize)> {
        let mut fresh = Database::new();
        let mut found = 0usize;

        for unit in UnitWalker::new(paths) {
            let unit = unit?;
            let class = decode(&unit.bytes, DecodeMode::Shallow)
                .with_context(|| format!("Bad class file {}", unit.name))?;
            self.sink
                .report(Diagnostic::new(Severity::Debug, &unit.name, class.name.replace('/', ".")));
            found += 1;
            fresh.insert(SignatureSet::from_class(&class));
        }

        if found == 0 {
            return Err(BuildError::EmptyBaseline.into());
        }

        let mut db = if self.bases.is_empty() {
            fresh
        } else {
            merge(std::iter::once(fresh).chain(self.bases.iter().cloned()))
        };
        if !self.include.is_empty() {
            db.retain(|set| self.include.matches(&set.name));
        }
        if !self.exclude.is_empty() {
            db.retain(|set| !self.exclude.matches(&set.name));
        }

        Ok((db, found))
    }
}

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
