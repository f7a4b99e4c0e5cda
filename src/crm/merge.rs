//! Merge partial records that share an id into complete records.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::fetch::PartialRecord;

/// The union of every partial record seen for one remote id.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl MergedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Merged records in first-arrival order, with an id index for O(1) lookup.
#[derive(Debug, Default, Clone)]
pub struct MergedRecords {
    records: Vec<MergedRecord>,
    index: HashMap<String, usize>,
}

impl MergedRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one partial record in. Fields already present for the same id
    /// are overwritten by the newer value.
    pub fn absorb(&mut self, partial: PartialRecord) {
        match self.index.get(&partial.id) {
            Some(&slot) => {
                let existing = &mut self.records[slot].fields;
                for (key, value) in partial.fields {
                    existing.insert(key, value);
                }
            }
            None => {
                self.index.insert(partial.id.clone(), self.records.len());
                self.records.push(MergedRecord {
                    id: partial.id,
                    fields: partial.fields,
                });
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&MergedRecord> {
        self.index.get(id).map(|&slot| &self.records[slot])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MergedRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a MergedRecords {
    type Item = &'a MergedRecord;
    type IntoIter = std::slice::Iter<'a, MergedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<PartialRecord> for MergedRecords {
    fn from_iter<I: IntoIterator<Item = PartialRecord>>(iter: I) -> Self {
        let mut merged = Self::new();
        for partial in iter {
            merged.absorb(partial);
        }
        merged
    }
}

/// Merge partials in arrival order (last write wins per field).
pub fn merge(partials: impl IntoIterator<Item = PartialRecord>) -> MergedRecords {
    partials.into_iter().collect()
}
