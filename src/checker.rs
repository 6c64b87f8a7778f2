//! Checks compiled units against a signature database.
//!
//! Every class, field and method a unit references must resolve in the
//! database, either on the named owner or (for members other than
//! constructors and static initializers) on one of its supertypes.
//! Classes defined by the checked code itself, or by its classpath, are
//! never reported.

use anyhow::{Context, Result};
use rayon::iter::{ParallelBridge, ParallelIterator};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::catalog::TargetCatalog;
use crate::classfile::descriptor::{field_type_class, is_initializer, to_source_form};
use crate::classfile::{ClassFile, DecodeMode, ReferenceKind, SuppressionMarkers, decode};
use crate::codec::read_database;
use crate::diagnostic::{Diagnostic, DiagnosticSink, Severity};
use crate::ignore_rules::IgnoreRules;
use crate::signature::Database;
use crate::walker::{CompiledUnit, UnitWalker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScanOutcome {
    pub violations_found: bool,
    pub units_scanned: usize,
}

pub struct SignatureChecker {
    db: Database,
    ignore: IgnoreRules,
    markers: SuppressionMarkers,
    check_archives: bool,
    source_roots: Vec<PathBuf>,
    classpath: Vec<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Found,
    /// Found after widening an object return type to its superclass.
    CovariantReturn { declared: String },
    Missing,
}

impl SignatureChecker {
    pub fn new(db: Database, ignore: IgnoreRules) -> Self {
        Self {
            db,
            ignore,
            markers: SuppressionMarkers::default(),
            check_archives: true,
            source_roots: Vec::new(),
            classpath: Vec::new(),
        }
    }

    pub fn load<R: Read>(reader: R, ignore: IgnoreRules) -> Result<Self> {
        let db = read_database(reader).context("Failed to load signature database")?;
        tracing::debug!(classes = db.len(), "loaded signature database");
        Ok(Self::new(db, ignore))
    }

    /// Replaces the default suppression annotations.
    pub fn markers(mut self, markers: SuppressionMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn check_archives(mut self, enabled: bool) -> Self {
        self.check_archives = enabled;
        self
    }

    /// Directories searched for a unit's source file; a match is used as
    /// the unit name in diagnostics.
    pub fn source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }

    /// Dependencies whose classes count as available but are not checked.
    pub fn classpath(mut self, paths: Vec<PathBuf>) -> Self {
        self.classpath = paths;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checks every unit under `paths`. A first pass catalogs the classes
    /// and marked scopes of the checked code; units are then checked in
    /// parallel. The first walk or decode failure aborts the scan.
    pub fn scan<P: AsRef<Path>>(&self, paths: &[P], sink: &dyn DiagnosticSink) -> Result<ScanOutcome> {
        let mut catalog = TargetCatalog::new();
        catalog.collect_targets(paths, self.check_archives, &self.markers)?;
        catalog.collect_classpath(&self.classpath)?;
        tracing::debug!(classes = catalog.len(), "catalogued checked classes");

        let violations = AtomicBool::new(false);
        let units = AtomicUsize::new(0);

        UnitWalker::new(paths)
            .check_archives(self.check_archives)
            .par_bridge()
            .try_for_each(|unit| -> Result<()> {
                let unit = unit?;
                if self.check_cataloged_unit(&unit, &catalog, sink)? {
                    violations.store(true, Ordering::Relaxed);
                }
                units.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })?;

        let outcome = ScanOutcome {
            violations_found: violations.into_inner(),
            units_scanned: units.into_inner(),
        };
        tracing::debug!(?outcome, "scan finished");
        Ok(outcome)
    }

    /// Checks one unit on its own, returning whether it had any violation.
    pub fn check_unit(&self, unit: &CompiledUnit, sink: &dyn DiagnosticSink) -> Result<bool> {
        self.check_cataloged_unit(unit, &TargetCatalog::default(), sink)
    }

    /// Checks one unit, treating classes in `catalog` as defined and its
    /// marked scopes as suppressed.
    pub fn check_cataloged_unit(
        &self,
        unit: &CompiledUnit,
        catalog: &TargetCatalog,
        sink: &dyn DiagnosticSink,
    ) -> Result<bool> {
        let class = decode(&unit.bytes, DecodeMode::Full)
            .with_context(|| format!("Bad class file {}", unit.name))?;

        if self.markers.any_marker(&class.annotations) || catalog.is_suppressed(&class.name) {
            return Ok(false);
        }

        let mut check = UnitCheck {
            checker: self,
            catalog,
            class_name: &class.name,
            unit: self.display_name(unit, &class),
            sink,
            reported: HashSet::new(),
            violations: false,
        };

        for field in &class.fields {
            if self.markers.any_marker(&field.annotations) {
                continue;
            }
            if let Some(type_name) = field_type_class(&field.descriptor) {
                check.check_type(type_name, None);
            }
        }

        for method in &class.methods {
            if self.markers.any_marker(&method.annotations) {
                continue;
            }
            for reference in &method.references {
                match &reference.kind {
                    ReferenceKind::Type { name } => check.check_type(name, reference.line),
                    ReferenceKind::Method {
                        owner,
                        name,
                        descriptor,
                    } => check.check_member(owner, &format!("{name}{descriptor}"), reference.line),
                    ReferenceKind::Field {
                        owner,
                        name,
                        descriptor,
                    } => check.check_member(owner, &format!("{name}#{descriptor}"), reference.line),
                }
            }
        }

        Ok(check.violations)
    }

    fn display_name(&self, unit: &CompiledUnit, class: &ClassFile) -> String {
        let Some(source) = class.source_file.as_deref() else {
            return unit.name.clone();
        };
        let package = class.name.rsplit_once('/').map_or("", |(package, _)| package);
        self.source_roots
            .iter()
            .map(|root| root.join(package).join(source))
            .find(|candidate| candidate.is_file())
            .map(|found| found.display().to_string())
            .unwrap_or_else(|| unit.name.clone())
    }

    /// Depth-first search of `owner` and its supertypes, superclass before
    /// interfaces. Initializers are only looked up on `owner` itself.
    fn find(&self, owner: &str, signature: &str) -> bool {
        let Some(start) = self.db.get(owner) else {
            return false;
        };
        if start.contains(signature) {
            return true;
        }
        if is_initializer(signature) {
            return false;
        }

        let mut visited: HashSet<&str> = HashSet::from([start.name.as_str()]);
        let mut stack: Vec<&str> = start.supertypes().rev().collect();
        while let Some(name) = stack.pop() {
            if !visited.insert(name) {
                continue;
            }
            let Some(set) = self.db.get(name) else {
                continue;
            };
            if set.contains(signature) {
                return true;
            }
            stack.extend(set.supertypes().rev());
        }
        false
    }

    fn resolve(&self, owner: &str, signature: &str) -> Resolution {
        if self.find(owner, signature) {
            return Resolution::Found;
        }
        if !self.db.contains(owner) {
            return Resolution::Missing;
        }

        // A method whose object return type was narrowed in a later release
        // still links against the wider declaration.
        let widened = signature.rsplit_once(')').and_then(|(params, ret)| {
            let returned = ret.strip_prefix('L')?.strip_suffix(';')?;
            let superclass = self.db.get(returned)?.superclass.as_deref()?;
            Some(format!("{params})L{superclass};"))
        });
        match widened {
            Some(declared) if self.find(owner, &declared) => Resolution::CovariantReturn { declared },
            _ => Resolution::Missing,
        }
    }
}

/// Per-unit state: diagnostics already reported and whether any was a
/// violation.
struct UnitCheck<'a> {
    checker: &'a SignatureChecker,
    catalog: &'a TargetCatalog,
    class_name: &'a str,
    unit: String,
    sink: &'a dyn DiagnosticSink,
    reported: HashSet<String>,
    violations: bool,
}

impl UnitCheck<'_> {
    fn skipped(&self, owner: &str) -> bool {
        owner.starts_with('[')
            || owner == self.class_name
            || self.catalog.defines(owner)
            || self.checker.ignore.is_ignored(owner)
    }

    fn check_type(&mut self, owner: &str, line: Option<u16>) {
        if self.skipped(owner) || self.checker.db.contains(owner) {
            return;
        }
        self.violation(owner, None, line);
    }

    fn check_member(&mut self, owner: &str, signature: &str, line: Option<u16>) {
        if self.skipped(owner) {
            return;
        }
        match self.checker.resolve(owner, signature) {
            Resolution::Found => {}
            Resolution::CovariantReturn { declared } => {
                let message = format!(
                    "covariant return type change detected: {} has been changed to {}",
                    to_source_form(owner, Some(&declared)),
                    to_source_form(owner, Some(signature)),
                );
                self.report(Diagnostic::new(Severity::Info, &self.unit, message).at_line(line));
            }
            Resolution::Missing => self.violation(owner, Some(signature), line),
        }
    }

    fn violation(&mut self, owner: &str, signature: Option<&str>, line: Option<u16>) {
        self.violations = true;
        let message = match signature {
            Some(signature) => format!("undefined reference: {owner}.{signature}"),
            None => format!("undefined reference: {owner}"),
        };
        let diagnostic = Diagnostic::new(Severity::Error, &self.unit, message)
            .at_line(line)
            .with_source_form(to_source_form(owner, signature));
        self.report(diagnostic);
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if self.reported.insert(diagnostic.message.clone()) {
            self.sink.report(diagnostic);
        }
    }
}
