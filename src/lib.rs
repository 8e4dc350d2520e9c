pub mod cache;
pub mod context;
pub mod core;
pub mod document_store;
pub mod embedding;
pub mod error;
pub mod http;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod query;
pub mod retrieval;
pub mod session;
pub mod stream;
pub mod telemetry;

pub use core::types;
pub use core::types::*;
pub use core::AppState;
pub use error::{CoreError, CoreResult};
