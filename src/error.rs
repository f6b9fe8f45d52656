use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the invoice engine. Every fallible operation in the
/// crate surfaces one of these; nothing is swallowed or auto-repaired.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("relative day offset {0} is outside the allowed range -7..=7")]
    InvalidOffset(i64),

    #[error("invalid calendar date {0:?}")]
    InvalidDate(String),

    #[error("recipient name {0:?} does not yield a usable folder name")]
    UnsafeRecipientName(String),

    #[error("a file already exists at {}", .0.display())]
    UnexpectedFileCollision(PathBuf),

    #[error("invoice record already exists for {recipient} {year} #{number}")]
    DuplicateKey {
        recipient: String,
        year: i32,
        number: i64,
    },

    #[error("no invoice record for {recipient} {year} #{number}")]
    NotFound {
        recipient: String,
        year: i32,
        number: i64,
    },

    #[error("invoice file is missing: {}", .0.display())]
    FileMissing(PathBuf),

    /// The PDF landed on disk but its record could not be appended. The file
    /// is left in place; repair is a user decision, never automatic.
    #[error("invoice file {} was written but its record could not be stored: {source}", .path.display())]
    OrphanFileAfterFailedRecord {
        path: PathBuf,
        #[source]
        source: Box<EngineError>,
    },

    #[error("pdf rendering failed: {0}")]
    RenderFailure(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
