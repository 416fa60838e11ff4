//! Keyed registry of test resources.
//!
//! Names are unique, non-empty and free of whitespace. Entries keep
//! registration order, which is also the order every selection is returned in.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::domain::config::check_resource_name;
use crate::domain::error::{Result, TestLoopError};
use crate::resource::TestResource;

/// A registered `(name, resource)` pair.
pub type RegistryEntry = (String, Arc<dyn TestResource>);

/// Ordered, name-unique collection of test resources.
#[derive(Default, Clone)]
pub struct ResourceRegistry {
    entries: Vec<RegistryEntry>,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under a unique name.
    ///
    /// # Errors
    ///
    /// Returns `TestLoopError::Configuration` for an empty name, a name
    /// containing whitespace, or a name that is already registered; the
    /// existing entry is left untouched.
    pub fn register(&mut self, name: impl Into<String>, resource: Arc<dyn TestResource>) -> Result<()> {
        let name = name.into();
        check_resource_name(&name)?;
        if self.get(&name).is_some() {
            return Err(TestLoopError::Configuration(format!(
                "resource already registered: {name}"
            )));
        }
        debug!(resource = %name, "registered test resource");
        self.entries.push((name, resource));
        Ok(())
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TestResource>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, resource)| resource)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Select resources by pattern, in registration order.
    ///
    /// The selector is a whitespace-separated list of patterns; a resource
    /// is selected once if any pattern matches it.
    ///
    /// - `"*"`, `"all"` or empty: every resource
    /// - an exact name: that resource only
    /// - a pattern with `*` or `?`: glob match over the whole name
    /// - anything else: names containing the pattern
    ///
    /// `"all"` is an exact name when a resource is registered under it. An
    /// unknown name selects nothing; that is not an error.
    pub fn select(&self, selector: &str) -> Vec<RegistryEntry> {
        let patterns: Vec<&str> = selector.split_whitespace().collect();
        let selects_everything = patterns.is_empty()
            || patterns
                .iter()
                .any(|p| *p == "*" || (*p == "all" && self.get(p).is_none()));
        if selects_everything {
            return self.entries.clone();
        }

        let matchers: Vec<NameMatcher> = patterns
            .iter()
            .filter_map(|pattern| self.matcher(pattern))
            .collect();
        self.entries
            .iter()
            .filter(|(name, _)| matchers.iter().any(|m| m.matches(name)))
            .cloned()
            .collect()
    }

    fn matcher(&self, pattern: &str) -> Option<NameMatcher> {
        if self.get(pattern).is_some() {
            return Some(NameMatcher::Exact(pattern.to_string()));
        }
        if pattern.contains(['*', '?']) {
            return glob_to_regex(pattern).map(NameMatcher::Glob);
        }
        Some(NameMatcher::Substring(pattern.to_string()))
    }
}

enum NameMatcher {
    Exact(String),
    Glob(Regex),
    Substring(String),
}

impl NameMatcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Exact(exact) => name == exact,
            NameMatcher::Glob(glob) => glob.is_match(name),
            NameMatcher::Substring(part) => name.contains(part.as_str()),
        }
    }
}

/// Compile a `*`/`?` glob into an anchored regex; other characters match literally.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut source = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}
