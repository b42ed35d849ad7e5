use std::io::Write;
use std::path::Path;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use crate::document::{Document, Metadata};
use crate::errors::DbError;
use crate::index::IndexDescriptor;
use crate::types::{DocumentId, SerializableBsonDocument, SerializableDateTime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub body: SerializableBsonDocument,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Document> for DocumentRecord {
    fn from(d: &Document) -> Self {
        Self {
            id: d.id.to_string(),
            body: d.data.clone(),
            created_at: d.metadata.created_at.0.to_rfc3339(),
            updated_at: d.metadata.updated_at.0.to_rfc3339(),
        }
    }
}

impl DocumentRecord {
    /// # Errors
    /// Returns `DbError::SnapshotError` for a malformed id or timestamp.
    pub fn into_document(self) -> Result<Document, DbError> {
        let bad = |what: &str, e: &dyn std::fmt::Display| DbError::SnapshotError(format!("bad {what} in snapshot: {e}"));
        let id = uuid::Uuid::parse_str(&self.id).map_err(|e| bad("document id", &e))?;
        let ts = |s: &str| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|t| SerializableDateTime(t.with_timezone(&chrono::Utc)))
                .map_err(|e| bad("timestamp", &e))
        };
        Ok(Document {
            id: DocumentId(id),
            data: self.body,
            metadata: Metadata { created_at: ts(&self.created_at)?, updated_at: ts(&self.updated_at)? },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub name: String,
    /// Natural order.
    pub documents: Vec<DocumentRecord>,
    pub indexes: Vec<IndexDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbSnapshot {
    pub collections: Vec<CollectionSnapshot>,
}

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"BKS1";
pub const SNAPSHOT_CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub magic: [u8; 4],
    pub version: u32,
    pub snapshot: DbSnapshot,
}

impl SnapshotFile {
    #[must_use]
    pub const fn new(snapshot: DbSnapshot) -> Self {
        Self { magic: SNAPSHOT_MAGIC, version: SNAPSHOT_CURRENT_VERSION, snapshot }
    }
}

/// Encode a snapshot file with magic+version header.
///
/// # Errors
/// Returns `DbError::Encode` if bincode fails.
pub fn encode_snapshot_file(snap: &DbSnapshot) -> Result<Vec<u8>, DbError> {
    let file = SnapshotFile::new(snap.clone());
    Ok(encode_to_vec(&file, standard())?)
}

/// # Errors
/// Fails on a missing magic, a newer format version, or undecodable content.
pub fn decode_snapshot_from_bytes(bytes: &[u8]) -> Result<DbSnapshot, DbError> {
    if bytes.len() < 4 || bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(DbError::SnapshotError("missing or invalid snapshot magic".into()));
    }
    let (file, _) = decode_from_slice::<SnapshotFile, _>(bytes, standard())?;
    if file.version > SNAPSHOT_CURRENT_VERSION {
        return Err(DbError::SnapshotError(format!(
            "snapshot format version {} is newer than this build supports",
            file.version
        )));
    }
    Ok(file.snapshot)
}

/// Write via a temp file in the same directory, then rename over `path`.
///
/// # Errors
/// Returns an I/O or encode error; `path` is left untouched on failure.
pub fn write_snapshot(path: &Path, snap: &DbSnapshot) -> Result<(), DbError> {
    let bytes = encode_snapshot_file(snap)?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| DbError::Io(e.error.to_string()))?;
    log::info!("snapshot written: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// `Ok(None)` when no snapshot exists yet.
///
/// # Errors
/// Fails when the file exists but cannot be read or decoded.
pub fn read_snapshot(path: &Path) -> Result<Option<DbSnapshot>, DbError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    decode_snapshot_from_bytes(&bytes).map(Some)
}
