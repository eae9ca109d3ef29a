use crate::chunker::{CodeChunk, chunk_kind_of, extract_chunks};
use crate::embeddings::EmbeddingsBackend;
use crate::fingerprint::{fingerprint_tokens, indexable_files};
use recall_core::{EngineError, IndexConfig, Result, write_atomic};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A search result: the chunk plus its similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: CodeChunk,
    pub score: f32,
}

/// Outcome of a `build` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    pub fingerprint: String,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_indexed: usize,
    pub loaded_from_cache: bool,
    pub duration_ms: u64,
}

/// On-disk cache payload, one file per fingerprint.
#[derive(Serialize, Deserialize)]
struct IndexState {
    fingerprint: String,
    model_id: String,
    dimension: usize,
    chunks: Vec<CodeChunk>,
    vectors: Vec<Vec<f32>>,
}

/// Fingerprint-gated semantic index over a workspace tree.
///
/// `build` is the only entry point that touches the filesystem state: it
/// recomputes the fingerprint, reuses the matching cache entry when one
/// exists, and re-embeds everything otherwise. Invalidation is pull-based:
/// nothing watches the tree, and callers re-run `build` when they want the
/// index brought up to date.
pub struct SemanticIndex {
    root: PathBuf,
    cache_dir: PathBuf,
    config: IndexConfig,
    embeddings: Arc<dyn EmbeddingsBackend>,
    state: Option<IndexState>,
}

impl SemanticIndex {
    pub fn new(
        root: &Path,
        cache_dir: &Path,
        config: IndexConfig,
        embeddings: Arc<dyn EmbeddingsBackend>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
            config,
            embeddings,
            state: None,
        }
    }

    pub fn is_built(&self) -> bool {
        self.state.is_some()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.as_ref().map(|s| s.chunks.len()).unwrap_or(0)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.fingerprint.as_str())
    }

    /// Bring the index up to date with the tree. Returns early on a
    /// fingerprint match (in memory or on disk) without any embedding
    /// calls. A failed embedding pass aborts the rebuild and leaves the
    /// previous cache (in memory and on disk) untouched.
    pub fn build(&mut self) -> Result<BuildStats> {
        let started = std::time::Instant::now();

        let files = indexable_files(&self.root, &self.config);
        if files.is_empty() {
            return Err(EngineError::NothingToIndex(self.root.clone()).into());
        }
        let fingerprint = fingerprint_tokens(&self.root, &files);

        if let Some(state) = &self.state {
            if state.fingerprint == fingerprint {
                return Ok(BuildStats {
                    fingerprint,
                    chunks_indexed: state.chunks.len(),
                    loaded_from_cache: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..BuildStats::default()
                });
            }
        }

        if let Some(state) = self.load_cache(&fingerprint) {
            let chunks_indexed = state.chunks.len();
            self.state = Some(state);
            self.remove_stale_caches(&fingerprint);
            return Ok(BuildStats {
                fingerprint,
                chunks_indexed,
                loaded_from_cache: true,
                duration_ms: started.elapsed().as_millis() as u64,
                ..BuildStats::default()
            });
        }

        let (chunks, files_indexed, files_skipped) = self.extract_all(&files);
        if chunks.is_empty() {
            return Err(EngineError::NothingToIndex(self.root.clone()).into());
        }

        let vectors = self.embed_all(&chunks)?;

        let state = IndexState {
            fingerprint: fingerprint.clone(),
            model_id: self.embeddings.model_id().to_string(),
            dimension: self.embeddings.dimension(),
            chunks,
            vectors,
        };
        self.persist(&state)?;
        self.remove_stale_caches(&fingerprint);

        let stats = BuildStats {
            fingerprint,
            files_indexed,
            files_skipped,
            chunks_indexed: state.chunks.len(),
            loaded_from_cache: false,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.state = Some(state);
        Ok(stats)
    }

    /// Top-k chunks by cosine similarity, score descending, ties broken by
    /// original chunk order. `k` larger than the corpus returns everything.
    /// The configured similarity floor, when set, drops low-scoring hits;
    /// by default nothing is filtered and callers decide downstream.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("semantic index not built yet"))?;

        let query_vec = self
            .embeddings
            .embed(query)
            .map_err(|err| EngineError::EmbeddingFailed(err.to_string()))?;

        let mut hits: Vec<SearchHit> = state
            .chunks
            .iter()
            .zip(state.vectors.iter())
            .map(|(chunk, vector)| SearchHit {
                chunk: chunk.clone(),
                score: cosine_similarity(&query_vec, vector),
            })
            .collect();

        // Stable sort: equal scores keep chunk insertion order.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(floor) = self.config.min_similarity {
            hits.retain(|hit| hit.score >= floor);
        }
        hits.truncate(k);
        Ok(hits)
    }

    fn extract_all(&self, files: &[PathBuf]) -> (Vec<CodeChunk>, usize, usize) {
        let mut chunks = Vec::new();
        let mut files_indexed = 0;
        let mut files_skipped = 0;
        for path in files {
            let Some(kind) = chunk_kind_of(path, &self.config) else {
                continue;
            };
            // Binary or unreadable files are skipped, not fatal.
            let Ok(content) = fs::read_to_string(path) else {
                files_skipped += 1;
                continue;
            };
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            let extracted = extract_chunks(&rel, &content, kind, self.config.chunk_max_lines);
            if !extracted.is_empty() {
                files_indexed += 1;
                chunks.extend(extracted);
            }
        }
        (chunks, files_indexed, files_skipped)
    }

    fn embed_all(&self, chunks: &[CodeChunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        let batch = self.config.embed_batch_size.max(1);
        for group in chunks.chunks(batch) {
            let texts: Vec<&str> = group.iter().map(|c| c.content.as_str()).collect();
            let embedded = self
                .embeddings
                .embed_batch(&texts)
                .map_err(|err| EngineError::EmbeddingFailed(err.to_string()))?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    fn cache_path(&self, fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("semantic-{fingerprint}.json"))
    }

    fn load_cache(&self, fingerprint: &str) -> Option<IndexState> {
        let path = self.cache_path(fingerprint);
        if !path.exists() {
            return None;
        }
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice::<IndexState>(&raw) {
            Ok(state)
                if state.fingerprint == fingerprint
                    && state.chunks.len() == state.vectors.len()
                    && state.model_id == self.embeddings.model_id() =>
            {
                Some(state)
            }
            // Corrupt or mismatched cache entries are discarded and
            // rebuilt rather than propagated.
            _ => {
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn persist(&self, state: &IndexState) -> Result<()> {
        let path = self.cache_path(&state.fingerprint);
        write_atomic(&path, &serde_json::to_vec(state)?)
    }

    fn remove_stale_caches(&self, current: &str) {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return;
        };
        let keep = format!("semantic-{current}.json");
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("semantic-") && name.ends_with(".json") && name != keep {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CountingEmbeddings, HashedEmbeddings};
    use std::sync::Arc;

    fn seed_two_file_workspace(dir: &Path) {
        fs::write(
            dir.join("fib.py"),
            "# recursive fibonacci sequence helper\ndef fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n",
        )
        .expect("write fib");
        fs::write(
            dir.join("sort.py"),
            "# bubble sort over a list\ndef bubble_sort(items):\n    for i in range(len(items)):\n        for j in range(len(items) - 1):\n            if items[j] > items[j + 1]:\n                items[j], items[j + 1] = items[j + 1], items[j]\n    return items\n",
        )
        .expect("write sort");
    }

    fn index_at(dir: &Path, embeddings: Arc<dyn EmbeddingsBackend>) -> SemanticIndex {
        SemanticIndex::new(
            dir,
            &dir.join(".recall/index"),
            IndexConfig::default(),
            embeddings,
        )
    }

    #[test]
    fn build_then_search_ranks_by_relevance() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());
        let mut index = index_at(dir.path(), Arc::new(HashedEmbeddings::new(256)));

        let stats = index.build().expect("build");
        assert!(!stats.loaded_from_cache);
        assert!(stats.chunks_indexed >= 2);

        let hits = index
            .search("recursive function that computes sequence", 3)
            .expect("search");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.file_path, "fib.py");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score, "descending order");
        }
    }

    #[test]
    fn second_build_reuses_cache_without_embedding() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());

        {
            let mut index = index_at(dir.path(), Arc::new(HashedEmbeddings::new(128)));
            index.build().expect("first build");
        }

        let counting = Arc::new(CountingEmbeddings::new(HashedEmbeddings::new(128)));
        let mut index = index_at(dir.path(), counting.clone());
        let stats = index.build().expect("second build");
        assert!(stats.loaded_from_cache);
        assert_eq!(counting.embedded_texts(), 0, "cache hit must not embed");

        // And search results still work off the loaded cache.
        let hits = index.search("bubble sort list", 2).expect("search");
        assert_eq!(hits[0].chunk.file_path, "sort.py");
    }

    #[test]
    fn mtime_touch_triggers_reembedding() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());

        let counting = Arc::new(CountingEmbeddings::new(HashedEmbeddings::new(64)));
        let mut index = index_at(dir.path(), counting.clone());
        let first = index.build().expect("build");
        let first_embeds = counting.embedded_texts();
        assert!(first_embeds > 0);

        let file = fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("fib.py"))
            .expect("open");
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .expect("set mtime");
        drop(file);

        let second = index.build().expect("rebuild");
        assert_ne!(first.fingerprint, second.fingerprint);
        assert!(!second.loaded_from_cache);
        assert!(counting.embedded_texts() > first_embeds);
    }

    #[test]
    fn k_beyond_corpus_returns_all_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());
        let mut index = index_at(dir.path(), Arc::new(HashedEmbeddings::new(64)));
        let stats = index.build().expect("build");

        let hits = index.search("anything at all", 1000).expect("search");
        assert_eq!(hits.len(), stats.chunks_indexed);
    }

    #[test]
    fn corrupt_cache_is_discarded_and_rebuilt() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());

        let mut index = index_at(dir.path(), Arc::new(HashedEmbeddings::new(64)));
        index.build().expect("build");

        // Clobber every cache entry on disk.
        let cache_dir = dir.path().join(".recall/index");
        for entry in fs::read_dir(&cache_dir).expect("read cache dir").flatten() {
            fs::write(entry.path(), b"{ not json").expect("corrupt");
        }

        let mut fresh = index_at(dir.path(), Arc::new(HashedEmbeddings::new(64)));
        let stats = fresh.build().expect("rebuild after corruption");
        assert!(!stats.loaded_from_cache);
        assert!(fresh.is_built());
    }

    #[test]
    fn empty_workspace_is_an_error_not_a_crash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut index = index_at(dir.path(), Arc::new(HashedEmbeddings::new(64)));
        let err = index.build().expect_err("nothing to index");
        assert!(err.to_string().contains("no files matched"));
    }

    #[test]
    fn embedding_failure_preserves_previous_cache() {
        struct FailingEmbeddings;
        impl EmbeddingsBackend for FailingEmbeddings {
            fn embed(&self, _: &str) -> Result<Vec<f32>> {
                Err(anyhow::anyhow!("embedding service down"))
            }
            fn dimension(&self) -> usize {
                64
            }
            fn model_id(&self) -> &str {
                "hashed-bow-v1"
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());

        let mut index = index_at(dir.path(), Arc::new(HashedEmbeddings::new(64)));
        index.build().expect("first build");

        // Invalidate, then fail the re-embed: the old cache file must
        // still be on disk and loadable.
        let file = fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("sort.py"))
            .expect("open");
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .expect("set mtime");
        drop(file);

        let mut failing = index_at(dir.path(), Arc::new(FailingEmbeddings));
        assert!(failing.build().is_err());

        let cache_entries = fs::read_dir(dir.path().join(".recall/index"))
            .expect("cache dir")
            .flatten()
            .count();
        assert_eq!(cache_entries, 1, "previous cache entry survives");
    }

    #[test]
    fn similarity_floor_filters_when_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_two_file_workspace(dir.path());
        let mut index = SemanticIndex::new(
            dir.path(),
            &dir.path().join(".recall/index"),
            IndexConfig {
                min_similarity: Some(0.99),
                ..IndexConfig::default()
            },
            Arc::new(HashedEmbeddings::new(64)),
        );
        index.build().expect("build");
        let hits = index.search("completely unrelated query text", 10).expect("search");
        assert!(
            hits.iter().all(|h| h.score >= 0.99),
            "floor must drop weak hits"
        );
    }
}
