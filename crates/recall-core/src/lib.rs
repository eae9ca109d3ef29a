use std::path::{Path, PathBuf};

mod config;
mod error;
mod fsutil;
mod types;
mod workspace;

pub use config::{
    EngineConfig, IndexConfig, LearningConfig, MemoryConfig, StoreConfig, StoreEndpoint,
    TelemetryConfig,
};
pub use error::EngineError;
pub use fsutil::write_atomic;
pub use types::{ActionRecord, WorkflowPattern, pattern_name};
pub use workspace::{WorkspaceContext, WorkspaceInfo};

pub type Result<T> = anyhow::Result<T>;

/// Per-workspace runtime directory holding the store, index cache,
/// session record, and logs.
pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".recall")
}

/// Global (non-workspace) runtime directory under the user's home, if one
/// can be resolved.
pub fn global_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())?;
    Some(PathBuf::from(home).join(".recall"))
}
