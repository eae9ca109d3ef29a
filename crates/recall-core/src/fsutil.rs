use crate::Result;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Write `bytes` to `path` via a temporary sibling file and an atomic
/// rename, so a crash mid-write can never leave a half-written file at the
/// destination. The temp file carries a unique suffix so concurrent
/// writers of the same path do not trample each other.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))?
        .to_string_lossy();
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::now_v7()));

    fs::write(&tmp, bytes)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}
