use crate::types::{DocumentId, SerializableBsonDocument, SerializableDateTime};
use bson::Document as BsonDocument;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    pub created_at: SerializableDateTime,
    pub updated_at: SerializableDateTime,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        let now = SerializableDateTime(Utc::now());
        Self { created_at: now.clone(), updated_at: now }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored document: the user-visible BSON body plus engine bookkeeping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: SerializableBsonDocument,
    pub metadata: Metadata,
}

impl Document {
    #[must_use]
    pub fn new(data: BsonDocument) -> Self {
        Self { id: DocumentId::new(), data: SerializableBsonDocument(data), metadata: Metadata::new() }
    }

    /// Borrow the BSON body.
    #[must_use]
    pub const fn body(&self) -> &BsonDocument {
        &self.data.0
    }

    pub fn update(&mut self, new_data: BsonDocument) {
        self.data = SerializableBsonDocument(new_data);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.metadata.updated_at = SerializableDateTime(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn update_replaces_body_and_bumps_timestamp() {
        let mut d = Document::new(doc! {"title": "Dune"});
        let before = d.metadata.updated_at.0;
        d.update(doc! {"title": "Dune Messiah"});
        assert_eq!(d.body().get_str("title").unwrap(), "Dune Messiah");
        assert!(d.metadata.updated_at.0 >= before);
        assert_eq!(d.metadata.created_at.0, before);
    }
}
