pub mod aggregate;
pub mod catalog;
pub mod cli;
pub mod collection;
pub mod config;
pub mod document;
pub mod errors;
pub mod index;
pub mod logger;
pub mod query;
pub mod runner;
pub mod snapshot;
pub mod types;

use crate::collection::Collection;
use crate::errors::DbError;
use crate::snapshot::{CollectionSnapshot, DbSnapshot, DocumentRecord};
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main database struct: named collections, optionally backed by a snapshot file.
pub struct Database {
    name: String,
    snapshot_path: Option<PathBuf>,
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("snapshot_path", &self.snapshot_path)
            .field("collections", &self.list_collection_names())
            .finish()
    }
}

impl Database {
    /// Creates a database that lives only in memory; `flush` is a no-op.
    #[must_use]
    pub fn open_in_memory(name: &str) -> Self {
        Self { name: name.to_string(), snapshot_path: None, collections: RwLock::new(HashMap::new()) }
    }

    /// Opens the database stored at `{dir}/{name}.snapshot`, loading it if present.
    ///
    /// # Errors
    /// Fails if an existing snapshot cannot be read or decoded.
    pub fn open(dir: &Path, name: &str) -> Result<Self, DbError> {
        let path = dir.join(format!("{name}.snapshot"));
        let db = Self {
            name: name.to_string(),
            snapshot_path: Some(path.clone()),
            collections: RwLock::new(HashMap::new()),
        };
        if let Some(snap) = snapshot::read_snapshot(&path)? {
            db.restore(snap)?;
            log::info!("opened {} from {}", name, path.display());
        } else {
            log::info!("opened new database {} at {}", name, path.display());
        }
        Ok(db)
    }

    fn restore(&self, snap: DbSnapshot) -> Result<(), DbError> {
        for cs in snap.collections {
            let col = self.collection(&cs.name);
            for record in cs.documents {
                col.insert_document(record.into_document()?);
            }
            for descriptor in cs.indexes {
                col.create_index(descriptor);
            }
        }
        Ok(())
    }

    /// Writes every collection to the snapshot file.
    ///
    /// # Errors
    /// Returns an I/O or encode error if the snapshot cannot be written.
    pub fn flush(&self) -> Result<(), DbError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let cols = self.collections.read();
        let mut names: Vec<&String> = cols.keys().collect();
        names.sort();
        let snap = DbSnapshot {
            collections: names
                .into_iter()
                .map(|n| {
                    let col = &cols[n];
                    CollectionSnapshot {
                        name: n.clone(),
                        documents: col.all_documents().iter().map(DocumentRecord::from).collect(),
                        indexes: col.list_indexes(),
                    }
                })
                .collect(),
        };
        snapshot::write_snapshot(path, &snap)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the named collection, creating it on first use.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(col) = self.collections.read().get(name) {
            return col.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                log::info!("created collection {name} in {}", self.name);
                Arc::new(Collection::new(name.to_string()))
            })
            .clone()
    }

    /// Retrieves a collection by its name.
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Lists the names of all collections.
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Deletes a collection by its name.
    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }
}

/// A handle on one collection of one database, acquired once and passed to every runner operation.
#[derive(Debug, Clone)]
pub struct Session {
    namespace: String,
    collection: Arc<Collection>,
}

impl Session {
    pub fn connect(db: &Database, collection: &str) -> Self {
        Self { namespace: format!("{}.{collection}", db.name()), collection: db.collection(collection) }
    }

    /// `database.collection`, e.g. `plp_bookstore.books`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub const fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use bson::doc;

    #[test]
    fn collections_are_created_once_and_dropped() {
        let db = Database::open_in_memory("plp_bookstore");
        let a = db.collection("books");
        a.insert_document(Document::new(doc! {"title": "Emma"}));
        assert_eq!(db.collection("books").len(), 1);
        assert_eq!(db.list_collection_names(), vec!["books".to_string()]);
        let s = Session::connect(&db, "books");
        assert_eq!(s.namespace(), "plp_bookstore.books");
        assert!(db.drop_collection("books"));
        assert!(db.get_collection("books").is_none());
        assert!(db.flush().is_ok());
    }
}
