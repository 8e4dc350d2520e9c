pub mod classify;

pub use classify::classify_query;
