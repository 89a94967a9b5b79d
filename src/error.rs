//! Error types for cryunpack

use thiserror::Error;

/// Main error type for cryunpack operations
///
/// Unknown enum values, unknown included-object tags and unregistered chunk
/// versions are not errors; they are carried in the decoded data and logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Invalid archive: {0}")]
    BadArchive(String),

    #[error("Invalid chunk file: {0}")]
    BadChunkFile(String),

    #[error("Invalid DataForge record data: {0}")]
    BadRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unhandled chunk type {chunk_type:#x} (version {version:#x})")]
    UnhandledChunkType { chunk_type: u32, version: u32 },

    #[error("Read of {len} bytes at offset {offset} is out of range")]
    OutOfRange { offset: u64, len: u64 },

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid CryXML format: {0}")]
    InvalidCryXml(String),

    #[error("XML output error: {0}")]
    Xml(String),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),
}

impl Error {
    /// True for errors a caller is expected to recover from by skipping the item
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias for cryunpack operations
pub type Result<T> = std::result::Result<T, Error>;
