//! Package ignore rules for the checker.
//!
//! Entries are dot or slash separated. A plain entry ignores exactly that
//! package (and a class of that exact name); `a.b.*` ignores `a.b` and
//! everything below it; any other `*` / `?` makes the entry a wildcard
//! pattern over the whole class name.

use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    exact: HashSet<String>,
    trees: Vec<String>,
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    pub fn new<I, S>(entries: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = IgnoreRules::default();
        for entry in entries {
            let entry = entry.as_ref().trim().replace('.', "/");
            if entry.is_empty() {
                continue;
            }

            if let Some(root) = entry.strip_suffix('*')
                && (root.is_empty() || root.ends_with('/'))
                && !has_wildcard(root)
            {
                rules.trees.push(root.trim_end_matches('/').to_string());
            } else if has_wildcard(&entry) {
                rules.patterns.push(wildcard_regex(&entry)?);
            } else {
                rules.exact.insert(entry);
            }
        }
        Ok(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.trees.is_empty() && self.patterns.is_empty()
    }

    /// Whether a slash-separated package name is covered by a plain or
    /// tree entry.
    pub fn matches_package(&self, package: &str) -> bool {
        self.exact.contains(package)
            || self.trees.iter().any(|root| {
                root.is_empty()
                    || package
                        .strip_prefix(root.as_str())
                        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }

    /// Whether references to `class_name` (internal form) are ignored.
    pub fn is_ignored(&self, class_name: &str) -> bool {
        let package = class_name.rsplit_once('/').map_or("", |(package, _)| package);
        self.matches_package(package)
            || self.exact.contains(class_name)
            || self.patterns.iter().any(|p| p.is_match(class_name))
    }
}

fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// `*` matches any run of characters, `?` exactly one; the pattern must
/// cover the whole name.
fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source)
}

/// Class-name filter built from the same wildcard syntax, used by the
/// signature builder's include/exclude lists.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    patterns: Vec<Regex>,
}

impl ClassFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| wildcard_regex(&p.as_ref().trim().replace('.', "/")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, class_name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(class_name))
    }
}
