//! Query-string and form-body arguments.
//!
//! The store keeps at most [`MAX_QUERY_ARGS`] entries. Pairs arriving after
//! the store is full are dropped without error and without being decoded.

use std::collections::HashMap;

use crate::http::decode::urldecode;
use crate::http::error::HttpError;
use crate::http::MAX_QUERY_ARGS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentEntry {
    pub name: String,
    pub value: String,
}

/// Ordered, bounded name/value store. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentStore {
    entries: Vec<ArgumentEntry>,
}

impl ArgumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `name=value&name=value` text.
    pub fn parse(raw: &str) -> Result<Self, HttpError> {
        let mut store = Self::new();
        store.extend_from_encoded(raw)?;
        Ok(store)
    }

    /// Decodes pairs from `raw` and appends them in encounter order.
    ///
    /// Empty segments and segments without `=` are skipped. Returns the
    /// number of entries added.
    pub fn extend_from_encoded(&mut self, raw: &str) -> Result<usize, HttpError> {
        let before = self.entries.len();

        for pair in raw.split('&') {
            if self.is_full() {
                tracing::debug!(limit = MAX_QUERY_ARGS, "argument store full, dropping remaining pairs");
                break;
            }

            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }

            self.entries.push(ArgumentEntry {
                name: urldecode(name)?,
                value: urldecode(value)?,
            });
        }

        Ok(self.entries.len() - before)
    }

    /// Value of the first entry with exactly this name.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Every value for each requested name, in encounter order.
    ///
    /// Each requested name is present in the result, with an empty list when
    /// nothing matched.
    pub fn lookup_multiple<'a>(&'a self, names: &[&'a str]) -> HashMap<&'a str, Vec<&'a str>> {
        names
            .iter()
            .map(|&name| {
                let values = self
                    .entries
                    .iter()
                    .filter(|e| e.name == name)
                    .map(|e| e.value.as_str())
                    .collect();
                (name, values)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_QUERY_ARGS
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgumentEntry> {
        self.entries.iter()
    }
}
