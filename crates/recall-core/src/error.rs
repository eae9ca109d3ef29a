use std::path::PathBuf;
use thiserror::Error;

/// Failure modes that cross the engine boundary.
///
/// Anything not covered here (unreadable files during extraction,
/// malformed store rows) is handled per-item and reported in aggregate
/// counts rather than surfaced as an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no workspace selected; select a workspace root first")]
    NoWorkspace,

    #[error("workspace root is not a usable directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("path escapes the workspace root: {0}")]
    PathOutsideWorkspace(PathBuf),

    #[error("no files matched the index filters under {0}")]
    NothingToIndex(PathBuf),

    #[error("context store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("embedding backend failed: {0}")]
    EmbeddingFailed(String),

    #[error("index cache entry is corrupt: {0}")]
    CorruptCache(PathBuf),
}
