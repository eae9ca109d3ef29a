use crate::{EngineError, Result, runtime_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The directory the engine operates on, validated once and passed
/// explicitly to every component.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub path: String,
    pub file_count: usize,
    pub dir_count: usize,
    pub total_bytes: u64,
}

impl WorkspaceContext {
    /// Select a workspace root. The path must exist and be a directory.
    pub fn select(path: &Path) -> Result<Self> {
        let root = path
            .canonicalize()
            .map_err(|_| EngineError::InvalidRoot(path.to_path_buf()))?;
        if !root.is_dir() {
            return Err(EngineError::InvalidRoot(root).into());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runtime_dir(&self) -> PathBuf {
        runtime_dir(&self.root)
    }

    /// Resolve a relative path inside the workspace, rejecting traversal
    /// outside the root. Normalization is lexical so the target does not
    /// need to exist yet.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        use std::path::Component;
        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if resolved == self.root || !resolved.pop() {
                        return Err(EngineError::PathOutsideWorkspace(
                            self.root.join(relative),
                        )
                        .into());
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(
                        EngineError::PathOutsideWorkspace(PathBuf::from(relative)).into()
                    );
                }
            }
        }
        Ok(resolved)
    }

    /// Express an absolute path relative to the root when possible.
    pub fn relativize(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    pub fn info(&self) -> WorkspaceInfo {
        let mut file_count = 0;
        let mut dir_count = 0;
        let mut total_bytes = 0;
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if entry.path() == self.root {
                continue;
            }
            if entry.file_type().is_dir() {
                dir_count += 1;
            } else if entry.file_type().is_file() {
                file_count += 1;
                total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        WorkspaceInfo {
            path: self.root.to_string_lossy().to_string(),
            file_count,
            dir_count,
            total_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_rejects_missing_directory() {
        let missing = std::env::temp_dir().join("recall-no-such-dir-xyz");
        assert!(WorkspaceContext::select(&missing).is_err());
    }

    #[test]
    fn resolve_rejects_escape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceContext::select(dir.path()).expect("select");
        assert!(ws.resolve("../outside").is_err());
        assert!(ws.resolve("inside/file.rs").is_ok());
    }

    #[test]
    fn info_counts_files_and_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("a.txt"), "hello").expect("write");
        std::fs::write(dir.path().join("sub/b.txt"), "world").expect("write");

        let ws = WorkspaceContext::select(dir.path()).expect("select");
        let info = ws.info();
        assert_eq!(info.file_count, 2);
        assert_eq!(info.dir_count, 1);
        assert_eq!(info.total_bytes, 10);
    }
}
