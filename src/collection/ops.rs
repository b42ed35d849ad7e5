use super::core::Collection;
use crate::document::Document;
use crate::index::{index_insert_all, index_remove_all};
use crate::types::DocumentId;

impl Collection {
    /// Store a document, giving it an `_id` (the engine id as a string) when it has none.
    pub fn insert_document(&self, mut document: Document) -> DocumentId {
        let doc_id = document.id.clone();
        if !document.data.0.contains_key("_id") {
            let mut body = bson::Document::new();
            body.insert("_id", doc_id.to_string());
            for (k, v) in std::mem::take(&mut document.data.0) {
                body.insert(k, v);
            }
            document.data.0 = body;
        }
        let mut st = self.store.write();
        index_insert_all(&mut self.indexes.write(), &document.data.0, &doc_id);
        let seq = st.next_seq;
        st.next_seq += 1;
        st.positions.insert(doc_id.clone(), seq);
        st.docs.insert(seq, document);
        log::debug!("insert {} into {}", doc_id, self.name_str());
        doc_id
    }

    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        let st = self.store.read();
        st.positions.get(id).and_then(|seq| st.docs.get(seq)).cloned()
    }

    /// Replace the stored document in place; its natural position is kept.
    pub fn update_document(&self, id: &DocumentId, new_document: Document) -> bool {
        let mut st = self.store.write();
        let Some(seq) = st.positions.get(id).copied() else {
            return false;
        };
        let mut new_doc_same_id = new_document;
        new_doc_same_id.id = id.clone();
        let mut mgr = self.indexes.write();
        if let Some(old) = st.docs.get(&seq) {
            index_remove_all(&mut mgr, &old.data.0, id);
        }
        index_insert_all(&mut mgr, &new_doc_same_id.data.0, id);
        st.docs.insert(seq, new_doc_same_id);
        true
    }

    pub fn delete_document(&self, id: &DocumentId) -> bool {
        let mut st = self.store.write();
        let Some(seq) = st.positions.remove(id) else {
            return false;
        };
        if let Some(old) = st.docs.remove(&seq) {
            index_remove_all(&mut self.indexes.write(), &old.data.0, id);
        }
        log::debug!("delete {} from {}", id, self.name_str());
        true
    }

    /// All documents in natural (insertion) order.
    pub fn all_documents(&self) -> Vec<Document> {
        self.store.read().docs.values().cloned().collect()
    }

    /// Return only the IDs of all documents, in natural order.
    pub fn list_ids(&self) -> Vec<DocumentId> {
        self.store.read().docs.values().map(|d| d.id.clone()).collect()
    }

    /// Reorder ids (e.g. index scan output) into natural order, dropping unknown ones.
    pub fn natural_order(&self, ids: Vec<DocumentId>) -> Vec<DocumentId> {
        let st = self.store.read();
        let mut keyed: Vec<(u64, DocumentId)> =
            ids.into_iter().filter_map(|id| st.positions.get(&id).map(|s| (*s, id))).collect();
        keyed.sort_by_key(|(s, _)| *s);
        keyed.dedup_by_key(|(s, _)| *s);
        keyed.into_iter().map(|(_, id)| id).collect()
    }

    /// Remove every document; index definitions survive but are emptied.
    pub fn clear(&self) -> usize {
        let mut st = self.store.write();
        let n = st.docs.len();
        st.docs.clear();
        st.positions.clear();
        let mut mgr = self.indexes.write();
        for idx in mgr.indexes.values_mut() {
            idx.map.clear();
            idx.stats.keys = 0;
            idx.stats.entries = 0;
        }
        n
    }
}
