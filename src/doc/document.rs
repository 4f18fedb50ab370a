//! Documents and their metadata

use crate::doc::DocContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Multi-valued document metadata
///
/// Fields are kept sorted by name so any iteration over them is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    fields: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to a field
    pub fn add(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(value.into());
    }

    /// Replaces all values of a field with a single one
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), vec![value.into()]);
    }

    /// Gets the first value of a field
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Gets every value of a field
    pub fn get_all(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<String>> {
        self.fields.remove(field)
    }

    /// Iterates over fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merges another metadata set into this one, appending values
    pub fn extend(&mut self, other: Metadata) {
        for (field, values) in other.fields {
            self.fields.entry(field).or_default().extend(values);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.add(k, v);
        }
        metadata
    }
}

/// A document flowing through the importer and committer pipelines
///
/// Exclusively owned by the pipeline context processing its reference.
#[derive(Debug, Clone)]
pub struct Document {
    pub context: DocContext,
    pub content: Vec<u8>,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(context: DocContext) -> Self {
        Self {
            context,
            content: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn reference(&self) -> &str {
        &self.context.reference
    }
}
