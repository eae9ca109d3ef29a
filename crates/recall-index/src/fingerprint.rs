use recall_core::{IndexConfig, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Directory names that never contain indexable sources.
const ARTIFACT_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "__pycache__",
    "build",
    "dist",
    "out",
    "venv",
];

/// Enumerate the files the index covers: matching extensions, not hidden,
/// not build output, under the size ceiling. The result is sorted so the
/// caller sees a deterministic order regardless of filesystem enumeration.
pub fn indexable_files(root: &Path, config: &IndexConfig) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build();

    let excludes: Vec<glob::Pattern> = config
        .exclude_globs
        .iter()
        .filter_map(|pattern| glob::Pattern::new(pattern).ok())
        .collect();

    let mut files = Vec::new();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() || is_artifact_path(root, path) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy();
        if excludes.iter().any(|pattern| pattern.matches(&rel)) {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !config.code_extensions.iter().any(|e| e == ext)
            && !config.doc_extensions.iter().any(|e| e == ext)
        {
            continue;
        }
        // Unreadable metadata skips the file, it is not fatal.
        match path.metadata() {
            Ok(meta) if meta.len() <= config.max_file_bytes => {
                files.push(path.to_path_buf());
            }
            _ => continue,
        }
    }
    files.sort();
    files
}

/// Content fingerprint over the file set: sorted `"path:mtime"` tokens
/// hashed with SHA-256. Identical tree state always produces the same
/// value; any path or mtime change produces a different one. Read-only:
/// a pure function of filesystem state at call time.
pub fn workspace_fingerprint(root: &Path, config: &IndexConfig) -> Result<String> {
    let files = indexable_files(root, config);
    Ok(fingerprint_tokens(root, &files))
}

pub(crate) fn fingerprint_tokens(root: &Path, files: &[PathBuf]) -> String {
    let mut tokens: Vec<String> = files
        .iter()
        .filter_map(|path| {
            let meta = path.metadata().ok()?;
            let mtime = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
            let rel = path.strip_prefix(root).unwrap_or(path);
            Some(format!("{}:{}", rel.to_string_lossy(), mtime.as_nanos()))
        })
        .collect();
    tokens.sort();

    let mut hasher = Sha256::new();
    for token in &tokens {
        hasher.update(token.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn is_artifact_path(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| {
            let name = component.as_os_str().to_string_lossy();
            ARTIFACT_DIRS.contains(&name.as_ref())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use recall_core::IndexConfig;
    use std::fs;

    fn seed_workspace(dir: &Path) {
        fs::write(dir.join("main.py"), "print('hello')\n").expect("write");
        fs::write(dir.join("notes.md"), "# notes\n").expect("write");
        fs::write(dir.join("image.bin"), [0_u8, 1, 2]).expect("write");
        fs::create_dir_all(dir.join("target")).expect("mkdir");
        fs::write(dir.join("target/gen.rs"), "fn x() {}\n").expect("write");
        fs::create_dir_all(dir.join(".hidden")).expect("mkdir");
        fs::write(dir.join(".hidden/secret.py"), "x = 1\n").expect("write");
    }

    #[test]
    fn skips_hidden_artifacts_and_unmatched_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_workspace(dir.path());
        let files = indexable_files(dir.path(), &IndexConfig::default());
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["main.py", "notes.md"]);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_workspace(dir.path());
        let cfg = IndexConfig::default();
        let a = workspace_fingerprint(dir.path(), &cfg).expect("fingerprint");
        let b = workspace_fingerprint(dir.path(), &cfg).expect("fingerprint");
        assert_eq!(a, b);
    }

    #[test]
    fn enumeration_order_does_not_matter() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_workspace(dir.path());
        let files = indexable_files(dir.path(), &IndexConfig::default());
        let mut reversed = files.clone();
        reversed.reverse();
        assert_eq!(
            fingerprint_tokens(dir.path(), &files),
            fingerprint_tokens(dir.path(), &reversed)
        );
    }

    #[test]
    fn mtime_touch_changes_fingerprint() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_workspace(dir.path());
        let cfg = IndexConfig::default();
        let before = workspace_fingerprint(dir.path(), &cfg).expect("fingerprint");

        let file = fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("main.py"))
            .expect("open");
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .expect("set mtime");
        drop(file);

        let after = workspace_fingerprint(dir.path(), &cfg).expect("fingerprint");
        assert_ne!(before, after, "same content, new mtime must invalidate");
    }

    #[test]
    fn exclude_globs_filter_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("keep.py"), "x = 1\n").expect("write");
        fs::write(dir.path().join("skip_generated.py"), "x = 2\n").expect("write");
        let cfg = IndexConfig {
            exclude_globs: vec!["skip_*".to_string()],
            ..IndexConfig::default()
        };
        let files = indexable_files(dir.path(), &cfg);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.py"));
    }

    #[test]
    fn oversized_files_are_excluded() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("big.py"), "x".repeat(64)).expect("write");
        let cfg = IndexConfig {
            max_file_bytes: 16,
            ..IndexConfig::default()
        };
        assert!(indexable_files(dir.path(), &cfg).is_empty());
    }

    proptest! {
        /// Hashing the same token set in any presentation order yields the
        /// same fingerprint.
        #[test]
        fn fingerprint_stable_over_file_sets(names in proptest::collection::btree_set("[a-z]{1,8}", 1..12)) {
            let dir = tempfile::tempdir().expect("tempdir");
            for name in &names {
                fs::write(dir.path().join(format!("{name}.py")), format!("# {name}\n"))
                    .expect("write");
            }
            let cfg = IndexConfig::default();
            let a = workspace_fingerprint(dir.path(), &cfg).expect("fingerprint");
            let b = workspace_fingerprint(dir.path(), &cfg).expect("fingerprint");
            prop_assert_eq!(a, b);
        }
    }
}
