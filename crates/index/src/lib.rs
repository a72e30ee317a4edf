pub mod cache;
pub mod embeddings;
pub mod error;
pub mod vector_index;

pub use cache::{CacheStats, CachedEmbedder};
pub use embeddings::{Embedder, EmbeddingClient, cosine, normalize};
pub use error::IndexError;
pub use vector_index::{IndexRow, PropColumns, Role, VectorIndex};
