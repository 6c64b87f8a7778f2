//! Catalog of the code under check: the classes it defines and the scopes
//! that carry a suppression marker.
//!
//! Local and anonymous classes compile to units of their own. The catalog
//! links each one to the class or method it was declared in, so a marker on
//! the outer scope also covers them.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::classfile::{ClassFile, DecodeMode, EnclosingMethod, SuppressionMarkers, decode};
use crate::walker::UnitWalker;

#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    defined: HashSet<String>,
    marked_classes: HashSet<String>,
    marked_methods: HashSet<String>,
    enclosing: HashMap<String, EnclosingMethod>,
}

impl TargetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outline-decodes every unit under `paths` and records it.
    pub fn collect_targets<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        check_archives: bool,
        markers: &SuppressionMarkers,
    ) -> Result<()> {
        for unit in UnitWalker::new(paths).check_archives(check_archives) {
            let unit = unit?;
            let class = decode(&unit.bytes, DecodeMode::Outline)
                .with_context(|| format!("Bad class file {}", unit.name))?;
            self.add(&class, markers);
        }
        Ok(())
    }

    /// Records the class names found under `paths` (dependencies that are
    /// present at run time but not checked themselves).
    pub fn collect_classpath<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        for unit in UnitWalker::new(paths) {
            let unit = unit?;
            let class = decode(&unit.bytes, DecodeMode::Shallow)
                .with_context(|| format!("Bad class file {}", unit.name))?;
            self.defined.insert(class.name);
        }
        Ok(())
    }

    pub fn add(&mut self, class: &ClassFile, markers: &SuppressionMarkers) {
        self.defined.insert(class.name.clone());
        if markers.any_marker(&class.annotations) {
            self.marked_classes.insert(class.name.clone());
        }
        for method in &class.methods {
            if markers.any_marker(&method.annotations) {
                self.marked_methods
                    .insert(method_key(&class.name, &method.signature()));
            }
        }
        if let Some(enclosing) = &class.enclosing {
            self.enclosing.insert(class.name.clone(), enclosing.clone());
        }
    }

    pub fn defines(&self, class_name: &str) -> bool {
        self.defined.contains(class_name)
    }

    pub fn len(&self) -> usize {
        self.defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defined.is_empty()
    }

    /// Whether `class_name` is marked, or was declared (through any number
    /// of local or anonymous classes) inside a marked class or method.
    pub fn is_suppressed(&self, class_name: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = class_name;
        loop {
            if self.marked_classes.contains(current) {
                return true;
            }
            if !seen.insert(current) {
                return false;
            }
            let Some(enclosing) = self.enclosing.get(current) else {
                return false;
            };
            if let Some(method) = &enclosing.method
                && self
                    .marked_methods
                    .contains(&method_key(&enclosing.class, method))
            {
                return true;
            }
            current = &enclosing.class;
        }
    }
}

fn method_key(class_name: &str, signature: &str) -> String {
    format!("{class_name}#{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_assembler::{ClassAssembler, Insn};
    use std::fs;

    const MARKER: &str = "Lorg/codehaus/mojo/animal_sniffer/IgnoreJRERequirement;";

    fn outline(bytes: Vec<u8>) -> ClassFile {
        decode(&bytes, DecodeMode::Outline).unwrap()
    }

    fn catalog_of(classes: Vec<Vec<u8>>) -> TargetCatalog {
        let markers = SuppressionMarkers::default();
        let mut catalog = TargetCatalog::new();
        for bytes in classes {
            catalog.add(&outline(bytes), &markers);
        }
        catalog
    }

    #[test]
    fn anonymous_class_inherits_class_marker() {
        let catalog = catalog_of(vec![
            ClassAssembler::new("p/Outer").annotation(MARKER).build(),
            ClassAssembler::new("p/Outer$1")
                .enclosing_method("p/Outer", Some(("run", "()V")))
                .build(),
            ClassAssembler::new("p/Outer$1$1")
                .enclosing_method("p/Outer$1", None)
                .build(),
            ClassAssembler::new("p/Plain$1")
                .enclosing_method("p/Plain", Some(("run", "()V")))
                .build(),
        ]);

        assert!(catalog.is_suppressed("p/Outer"));
        assert!(catalog.is_suppressed("p/Outer$1"));
        assert!(catalog.is_suppressed("p/Outer$1$1"));
        assert!(!catalog.is_suppressed("p/Plain$1"));
        assert!(!catalog.is_suppressed("p/Unknown"));
    }

    #[test]
    fn local_class_inherits_method_marker_only_from_its_method() {
        let body = [Insn::Return];
        let catalog = catalog_of(vec![
            ClassAssembler::new("p/Host")
                .annotated_method("guarded", "()V", &[MARKER], &body)
                .method("open", "()V", &body)
                .build(),
            ClassAssembler::new("p/Host$1")
                .enclosing_method("p/Host", Some(("guarded", "()V")))
                .build(),
            ClassAssembler::new("p/Host$2")
                .enclosing_method("p/Host", Some(("open", "()V")))
                .build(),
        ]);

        assert!(catalog.is_suppressed("p/Host$1"));
        assert!(!catalog.is_suppressed("p/Host$2"));
        assert!(!catalog.is_suppressed("p/Host"));
    }

    #[test]
    fn enclosing_cycles_terminate() {
        let catalog = catalog_of(vec![
            ClassAssembler::new("p/A").enclosing_method("p/B", None).build(),
            ClassAssembler::new("p/B").enclosing_method("p/A", None).build(),
        ]);
        assert!(!catalog.is_suppressed("p/A"));
    }

    #[test]
    fn collects_target_and_classpath_names() {
        let dir = std::env::temp_dir().join(format!(
            "sig-sniffer-catalog-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let targets = dir.join("classes");
        let deps = dir.join("deps");
        fs::create_dir_all(targets.join("p")).unwrap();
        fs::create_dir_all(deps.join("lib")).unwrap();
        fs::write(targets.join("p/A.class"), ClassAssembler::new("p/A").build()).unwrap();
        fs::write(
            targets.join("p/B.class"),
            ClassAssembler::new("p/B").annotation(MARKER).build(),
        )
        .unwrap();
        fs::write(deps.join("lib/Dep.class"), ClassAssembler::new("lib/Dep").build()).unwrap();

        let mut catalog = TargetCatalog::new();
        catalog
            .collect_targets(&[&targets], true, &SuppressionMarkers::default())
            .unwrap();
        catalog.collect_classpath(&[&deps]).unwrap();

        assert_eq!(catalog.len(), 3);
        assert!(catalog.defines("p/A") && catalog.defines("p/B") && catalog.defines("lib/Dep"));
        assert!(catalog.is_suppressed("p/B"));
        assert!(!catalog.is_suppressed("p/A"));

        let _ = fs::remove_dir_all(&dir);
    }
}
