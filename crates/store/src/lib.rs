pub mod embedding;
pub mod store;

pub use embedding::{EmbeddingBackend, EmbeddingClient, OpenAiEmbeddingClient};
pub use store::SqliteIndex;
