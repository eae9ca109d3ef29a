use recall_core::Result;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend trait for computing text embeddings.
///
/// Implementations turn text into dense vectors suitable for cosine
/// similarity. Object-safe so backends can be swapped at runtime; assumed
/// deterministic for identical input.
pub trait EmbeddingsBackend: Send + Sync {
    /// Embed a single text input.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch. Default implementation calls `embed` per item.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimensionality of the output vectors.
    fn dimension(&self) -> usize;

    /// Model identifier string.
    fn model_id(&self) -> &str;
}

/// Local deterministic embeddings via feature hashing.
///
/// Tokens are lowercased alphanumeric runs; each token is hashed into a
/// bucket of the output vector with a hash-derived sign, and the result is
/// L2-normalized. Cosine similarity between such vectors reflects token
/// overlap, which is enough for retrieval without an ML runtime. A real
/// sentence-embedding service can replace this behind the same trait.
pub struct HashedEmbeddings {
    dimension: usize,
}

impl HashedEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl EmbeddingsBackend for HashedEmbeddings {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(
                digest[0..8].try_into().unwrap_or([0; 8]),
            ) as usize
                % self.dimension;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "hashed-bow-v1"
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(|token| token.to_ascii_lowercase())
}

/// Shared handle around a lazily-constructed backend. Construction runs at
/// most once even under concurrent first use; every caller sees the same
/// instance afterwards.
pub struct SharedEmbeddings {
    cell: OnceLock<Arc<dyn EmbeddingsBackend>>,
    factory: Box<dyn Fn() -> Arc<dyn EmbeddingsBackend> + Send + Sync>,
}

impl SharedEmbeddings {
    pub fn new(factory: impl Fn() -> Arc<dyn EmbeddingsBackend> + Send + Sync + 'static) -> Self {
        Self {
            cell: OnceLock::new(),
            factory: Box::new(factory),
        }
    }

    /// The default local backend at the given dimension.
    pub fn hashed(dimension: usize) -> Self {
        Self::new(move || Arc::new(HashedEmbeddings::new(dimension)))
    }

    pub fn get(&self) -> Arc<dyn EmbeddingsBackend> {
        self.cell.get_or_init(|| (self.factory)()).clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Wrapper counting how many texts were embedded. Used to assert that
/// cache hits perform no embedding work.
pub struct CountingEmbeddings<B> {
    inner: B,
    calls: AtomicUsize,
}

impl<B: EmbeddingsBackend> CountingEmbeddings<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn embedded_texts(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<B: EmbeddingsBackend> EmbeddingsBackend for CountingEmbeddings<B> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.embed(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
