pub mod cache;
pub mod client;

pub use cache::EmbeddingCache;
