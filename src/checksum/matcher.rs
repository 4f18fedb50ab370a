//! Metadata field selection

use crate::doc::Metadata;
use crate::ConfigError;
use regex::Regex;

/// Checks if a field name matches a wildcard pattern
///
/// A pattern ending with `*` matches any field starting with what precedes it,
/// a pattern starting with `*` matches any field ending with what follows it.
/// Anything else is an exact, case-sensitive match.
///
/// # Examples
///
/// ```
/// use gridcrawl::checksum::matches_field_name;
///
/// assert!(matches_field_name("Content-Type", "Content-Type"));
/// assert!(matches_field_name("X-*", "X-Custom"));
/// assert!(matches_field_name("*-Date", "Last-Date"));
/// assert!(!matches_field_name("X-*", "Content-Type"));
/// ```
pub fn matches_field_name(pattern: &str, candidate: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        candidate.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        candidate.ends_with(suffix)
    } else {
        candidate == pattern
    }
}

/// Selects metadata fields by name and/or regular expression
///
/// Listed names come first, in the order they were given; fields matched only
/// by the regex follow in name order. A field is never selected twice.
#[derive(Debug, Clone, Default)]
pub struct FieldMatcher {
    names: Vec<String>,
    pattern: Option<Regex>,
}

impl FieldMatcher {
    pub fn new(names: Vec<String>, pattern: Option<&str>) -> Result<Self, ConfigError> {
        let pattern = pattern.map(Regex::new).transpose()?;
        Ok(Self { names, pattern })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            pattern: None,
        }
    }

    /// True when the matcher can never select anything
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.pattern.is_none()
    }

    pub fn matches(&self, field: &str) -> bool {
        self.names.iter().any(|n| matches_field_name(n, field))
            || self.pattern.as_ref().map(|p| p.is_match(field)).unwrap_or(false)
    }

    /// Returns the selected fields and their values in match order
    pub fn select<'a>(&self, metadata: &'a Metadata) -> Vec<(&'a str, &'a [String])> {
        let mut selected: Vec<(&'a str, &'a [String])> = Vec::new();
        let mut push = |field: &'a str, values: &'a [String]| {
            if !selected.iter().any(|(f, _)| *f == field) {
                selected.push((field, values));
            }
        };

        for name in &self.names {
            if name.contains('*') {
                for (field, values) in metadata.iter() {
                    if matches_field_name(name, field) {
                        push(field, values);
                    }
                }
            } else if let Some((field, values)) = metadata.iter().find(|(f, _)| *f == name.as_str()) {
                push(field, values);
            }
        }

        if let Some(pattern) = &self.pattern {
            for (field, values) in metadata.iter() {
                if pattern.is_match(field) {
                    push(field, values);
                }
            }
        }

        selected
    }
}
