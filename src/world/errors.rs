use std::path::PathBuf;

use thiserror::Error;

/// Errors that can arise while mutating, loading or saving the world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, file writes, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog JSON could not be decoded.
    #[error("catalog error: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// No free interior vnum was found after a full wraparound search.
    #[error("no free room vnum between {min} and {max}")]
    VnumExhausted { min: i32, max: i32 },

    /// A persistence file ended early or contained an unparseable line.
    #[error("corrupt world file {path:?} line {line}: {reason}")]
    CorruptFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A sector, crop, building or vehicle vnum missing from the catalog.
    #[error("unknown {kind} prototype {vnum}")]
    UnknownPrototype { kind: &'static str, vnum: i32 },

    /// Caller asked for something the current world state does not allow.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl WorldError {
    pub fn corrupt(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        WorldError::CorruptFile {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
