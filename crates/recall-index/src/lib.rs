//! Semantic indexing: workspace fingerprinting, chunk extraction, text
//! embeddings, and the fingerprint-gated index with its disk cache.

pub mod chunker;
pub mod embeddings;
pub mod fingerprint;
pub mod semantic;

pub use chunker::{ChunkKind, CodeChunk, extract_chunks};
pub use embeddings::{CountingEmbeddings, EmbeddingsBackend, HashedEmbeddings, SharedEmbeddings};
pub use fingerprint::{indexable_files, workspace_fingerprint};
pub use semantic::{BuildStats, SearchHit, SemanticIndex};
