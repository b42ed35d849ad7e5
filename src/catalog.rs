//! The Book record, its projected view, and the bundled sample catalog.

use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use bson::Document as BsonDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const BUNDLED_CATALOG: &str = include_str!("../data/books.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
}

impl Book {
    /// # Errors
    /// Fails if the record cannot be encoded as BSON.
    pub fn to_document(&self) -> Result<BsonDocument, DbError> {
        Ok(bson::serialize_to_document(self)?)
    }

    /// Decode a stored document. Extra fields such as `_id` are ignored.
    ///
    /// # Errors
    /// Returns `DbError::InvalidBook` when a field is missing or has the wrong type.
    pub fn from_document(doc: &BsonDocument) -> Result<Self, DbError> {
        bson::deserialize_from_document(doc.clone()).map_err(|e| DbError::InvalidBook(e.to_string()))
    }
}

/// A read-only projection of a Book; fields left out of the projection are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookView {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
}

impl BookView {
    /// # Errors
    /// Returns `DbError::InvalidBook` when a present field has the wrong type.
    pub fn from_document(doc: &BsonDocument) -> Result<Self, DbError> {
        bson::deserialize_from_document(doc.clone()).map_err(|e| DbError::InvalidBook(e.to_string()))
    }
}

/// The twelve classic titles shipped with the binary.
///
/// # Errors
/// Fails only if the bundled JSON is malformed.
pub fn sample_catalog() -> Result<Vec<Book>, DbError> {
    Ok(serde_json::from_str(BUNDLED_CATALOG)?)
}

/// Read a JSON array of Book records.
///
/// # Errors
/// Returns an I/O error for an unreadable file or a JSON error for bad content.
pub fn load_catalog(path: &Path) -> Result<Vec<Book>, DbError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Insert `books` into `col` in order, optionally emptying it first. Returns the number inserted.
///
/// # Errors
/// Fails if a record cannot be encoded.
pub fn seed_collection(col: &Arc<Collection>, books: &[Book], reset: bool) -> Result<usize, DbError> {
    if reset {
        let removed = col.clear();
        log::info!("cleared {removed} documents from {}", col.name_str());
    }
    for book in books {
        col.insert_document(Document::new(book.to_document()?));
    }
    log::info!("seeded {} books into {}", books.len(), col.name_str());
    Ok(books.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn bundled_catalog_has_twelve_titles() {
        let books = sample_catalog().unwrap();
        assert_eq!(books.len(), 12);
        assert!(books.iter().any(|b| b.title == "The Hobbit" && b.genre == "Fantasy"));
        assert_eq!(books.iter().filter(|b| b.author == "J.R.R. Tolkien").count(), 2);
    }

    #[test]
    fn book_round_trips_through_bson_ignoring_id() {
        let book = sample_catalog().unwrap().remove(0);
        let mut d = book.to_document().unwrap();
        assert_eq!(d.get_i32("published_year").unwrap(), 1960);
        d.insert("_id", "abc");
        assert_eq!(Book::from_document(&d).unwrap(), book);
        assert!(matches!(Book::from_document(&doc! {"title": "x"}), Err(DbError::InvalidBook(_))));
    }

    #[test]
    fn view_keeps_only_projected_fields() {
        let v = BookView::from_document(&doc! {"title": "Emma", "price": 7.5}).unwrap();
        assert_eq!(v.title.as_deref(), Some("Emma"));
        assert_eq!(v.author, None);
        assert_eq!(serde_json::to_value(&v).unwrap(), serde_json::json!({"title": "Emma", "price": 7.5}));
    }
}
