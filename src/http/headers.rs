//! Bounded header tables.
//!
//! Entries keep insertion order and their original spelling; lookups ignore
//! ASCII case. Repeated names are allowed, as on the wire.

use crate::http::error::HttpError;
use crate::http::REQ_HEADER_MAX;

/// A single `Name: Value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered header collection holding at most [`REQ_HEADER_MAX`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: Vec<HeaderEntry>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, refusing the one that would exceed the bound.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), HttpError> {
        if self.entries.len() >= REQ_HEADER_MAX {
            return Err(HttpError::TooManyHeaders);
        }

        self.entries.push(HeaderEntry::new(name, value));
        Ok(())
    }

    /// Value of the first entry whose name matches, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name_matches(name))
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= REQ_HEADER_MAX
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a HeaderTable {
    type Item = &'a HeaderEntry;
    type IntoIter = std::slice::Iter<'a, HeaderEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
