pub mod cache;
pub mod search;
pub mod store;

pub use cache::{hash_content, CacheEntry, EmbeddingCache};
pub use search::{rank_chunks, RetrievalEngine, NO_CONTEXT_FALLBACK};
pub use store::MemoryChunkStore;
