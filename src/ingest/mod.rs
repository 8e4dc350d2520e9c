pub mod chunk;
pub mod enrich;
pub mod extract;

pub use chunk::chunk_document;
pub use enrich::enrich_chunks;
pub use extract::{extract, PreChunk};
