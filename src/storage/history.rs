//! Record of documents inserted during one ship.

use std::collections::HashMap;

/// Document ids inserted so far, keyed by collection.
///
/// Scoped to a single ship. A failed ship deletes everything recorded here.
#[derive(Debug)]
pub struct InsertionHistory<Id> {
    inserted: HashMap<String, Vec<Id>>,
}

impl<Id> Default for InsertionHistory<Id> {
    fn default() -> Self {
        Self {
            inserted: HashMap::new(),
        }
    }
}

impl<Id> InsertionHistory<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, collection: &str, id: Id) {
        self.inserted
            .entry(collection.to_string())
            .or_default()
            .push(id);
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &[Id])> {
        self.inserted
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(collection, ids)| (collection.as_str(), ids.as_slice()))
    }

    /// Total number of recorded documents.
    pub fn len(&self) -> usize {
        self.inserted.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.inserted.clear();
    }
}
