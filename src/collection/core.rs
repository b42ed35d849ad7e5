use crate::document::Document;
use crate::index::IndexManager;
use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Documents keyed by insertion sequence so iteration yields natural order.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub(crate) docs: BTreeMap<u64, Document>,
    pub(crate) positions: HashMap<DocumentId, u64>,
    pub(crate) next_seq: u64,
}

pub struct Collection {
    name: String,
    pub(crate) store: RwLock<Store>,
    pub indexes: RwLock<IndexManager>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name_str())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Collection {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name,
            store: RwLock::new(Store::default()),
            indexes: RwLock::new(IndexManager::new()),
        }
    }

    pub fn name_str(&self) -> String {
        self.name.clone()
    }

    pub fn len(&self) -> usize {
        self.store.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
