use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Invalid pipeline stage: {0}")]
    InvalidPipeline(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Document is not a valid book: {0}")]
    InvalidBook(String),

    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
