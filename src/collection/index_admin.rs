use super::core::Collection;
use crate::index::{IndexDescriptor, IndexStats, index_insert_all};

impl Collection {
    // --- Index admin helpers ---

    /// Create and build an index from the current documents. Creating an index
    /// that already exists is a no-op returning the same name.
    pub fn create_index(&self, descriptor: IndexDescriptor) -> String {
        let name = descriptor.name.clone();
        let st = self.store.read();
        let mut mgr = self.indexes.write();
        if !mgr.create_index(descriptor) {
            log::info!("index {name} already exists on {}", self.name_str());
            return name;
        }
        let start = std::time::Instant::now();
        // offline build: only the new index is empty, so rebuild it alone
        if let Some(idx) = mgr.indexes.get_mut(&name) {
            for doc in st.docs.values() {
                idx.insert(&doc.data.0, &doc.id);
            }
            idx.stats.build_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        }
        log::info!("created index {name} on {} ({} docs)", self.name_str(), st.docs.len());
        name
    }

    pub fn drop_index(&self, name: &str) -> bool {
        self.indexes.write().drop_index(name)
    }

    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes.read().descriptors()
    }

    /// Descriptors with their build and usage counters, sorted by name.
    pub fn index_stats(&self) -> Vec<(IndexDescriptor, IndexStats)> {
        let mgr = self.indexes.read();
        mgr.descriptors()
            .into_iter()
            .filter_map(|d| mgr.indexes.get(&d.name).map(|i| (d, i.stats.clone())))
            .collect()
    }

    /// Rebuild every index from scratch, e.g. after loading a snapshot.
    pub fn rebuild_indexes(&self) {
        let st = self.store.read();
        let mut mgr = self.indexes.write();
        let descriptors = mgr.descriptors();
        *mgr = crate::index::IndexManager::new();
        for d in descriptors {
            mgr.create_index(d);
        }
        for doc in st.docs.values() {
            index_insert_all(&mut mgr, &doc.data.0, &doc.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use bson::doc;

    #[test]
    fn create_index_builds_from_existing_docs_and_is_idempotent() {
        let col = Collection::new("books".into());
        col.insert_document(Document::new(doc! {"title": "Emma"}));
        col.insert_document(Document::new(doc! {"title": "Dune"}));
        let d = IndexDescriptor::from_document(&doc! {"title": 1}).unwrap();
        assert_eq!(col.create_index(d.clone()), "title_1");
        assert_eq!(col.create_index(d), "title_1");
        assert_eq!(col.list_indexes().len(), 1);
        assert_eq!(col.indexes.read().indexes["title_1"].stats.entries, 2);
        col.rebuild_indexes();
        assert_eq!(col.indexes.read().indexes["title_1"].stats.entries, 2);
        let stats = col.index_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!((stats[0].1.keys, stats[0].1.hits), (2, 0));
        assert!(col.drop_index("title_1"));
        assert!(col.list_indexes().is_empty());
    }
}
