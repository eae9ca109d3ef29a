use recall_core::IndexConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// What a chunk was extracted from, by extension class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Code,
    Doc,
}

/// A bounded contiguous slice of a source file: the unit of embedding and
/// retrieval. Immutable once created; identity is `(file_path,
/// content_hash)`. Chunks are regenerated wholesale on index rebuild,
/// never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Workspace-relative path.
    pub file_path: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub kind: ChunkKind,
    pub content_hash: String,
}

impl CodeChunk {
    pub fn identity(&self) -> (&str, &str) {
        (&self.file_path, &self.content_hash)
    }
}

/// Classify a path by the configured extension lists. `None` means the
/// file is not indexable.
pub fn chunk_kind_of(path: &Path, config: &IndexConfig) -> Option<ChunkKind> {
    let ext = path.extension()?.to_str()?;
    if config.code_extensions.iter().any(|e| e == ext) {
        Some(ChunkKind::Code)
    } else if config.doc_extensions.iter().any(|e| e == ext) {
        Some(ChunkKind::Doc)
    } else {
        None
    }
}

/// Split file content into chunks: a chunk closes at a blank line or at
/// the configured line cap, whichever comes first, and the next chunk
/// continues on the following line. Whitespace-only chunks are dropped.
///
/// This is a line heuristic, not syntax-aware segmentation: it trades
/// boundary precision for simplicity and works uniformly across
/// languages. Line ranges are gap-free and overlap-free across the file.
pub fn extract_chunks(
    rel_path: &str,
    content: &str,
    kind: ChunkKind,
    max_lines: usize,
) -> Vec<CodeChunk> {
    let cap = max_lines.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start_line = 1;
    let mut last_line = 0;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        current.push(line.trim_end());

        if line.trim().is_empty() || current.len() >= cap {
            push_chunk(&mut chunks, rel_path, kind, &current, start_line, line_no);
            current.clear();
            start_line = line_no + 1;
        }
    }
    push_chunk(&mut chunks, rel_path, kind, &current, start_line, last_line);
    chunks
}

fn push_chunk(
    chunks: &mut Vec<CodeChunk>,
    rel_path: &str,
    kind: ChunkKind,
    lines: &[&str],
    start_line: usize,
    end_line: usize,
) {
    if lines.iter().all(|line| line.trim().is_empty()) {
        return;
    }
    let content = lines.join("\n");
    chunks.push(CodeChunk {
        file_path: rel_path.to_string(),
        start_line,
        end_line,
        content_hash: content_hash(&content),
        content,
        kind,
    });
}

pub(crate) fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
