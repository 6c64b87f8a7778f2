//! Per-class signature sets and the name-keyed database they live in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::classfile::ClassFile;

/// The shape of one class: its member signatures and direct supertypes.
///
/// Members are `name(desc)ret` for methods and `name#desc` for fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet {
    pub name: String,
    pub members: BTreeSet<String>,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
}

impl SignatureSet {
    pub fn new(name: impl Into<String>, superclass: Option<String>, interfaces: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
            superclass,
            interfaces,
        }
    }

    pub fn from_class(class: &ClassFile) -> Self {
        let mut set = Self::new(
            class.name.clone(),
            class.super_name.clone(),
            class.interfaces.clone(),
        );
        set.members
            .extend(class.methods.iter().map(|m| m.signature()));
        set.members.extend(class.fields.iter().map(|f| f.signature()));
        set
    }

    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members.extend(members.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.members.contains(signature)
    }

    /// Direct supertypes, superclass first.
    pub fn supertypes(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.superclass
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }
}

/// Class name to [`SignatureSet`]. Read-only once built or loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    classes: HashMap<String, SignatureSet>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `set`, replacing (and returning) any previous entry of the
    /// same name.
    pub fn insert(&mut self, set: SignatureSet) -> Option<SignatureSet> {
        self.classes.insert(set.name.clone(), set)
    }

    pub fn get(&self, name: &str) -> Option<&SignatureSet> {
        self.classes.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut SignatureSet> {
        self.classes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignatureSet> {
        self.classes.values()
    }

    /// Entries ordered by class name.
    pub fn sorted(&self) -> Vec<&SignatureSet> {
        let mut sets: Vec<&SignatureSet> = self.classes.values().collect();
        sets.sort_by(|a, b| a.name.cmp(&b.name));
        sets
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&SignatureSet) -> bool) {
        self.classes.retain(|_, set| keep(set));
    }
}

impl FromIterator<SignatureSet> for Database {
    fn from_iter<I: IntoIterator<Item = SignatureSet>>(iter: I) -> Self {
        let mut db = Database::new();
        for set in iter {
            db.insert(set);
        }
        db
    }
}

impl IntoIterator for Database {
    type Item = SignatureSet;
    type IntoIter = std::collections::hash_map::IntoValues<String, SignatureSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.classes.into_values()
    }
}
