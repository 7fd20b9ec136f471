//! Trait boundary for embedding providers and vector stores. Concrete
//! implementations (OpenAI, local models, pgvector, Qdrant, ...) live
//! outside this crate; Conexus consumes them only through these traits.
use async_trait::async_trait;

use crate::Result;

/// Produces a dense vector representation of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A single vector-search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Nearest-neighbor search over stored embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;
}
