pub mod cache;
pub mod factory;
pub mod huggingface;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod retry;

pub use cache::CachedEmbedder;
pub use factory::build_embedder;
pub use huggingface::HuggingFaceEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use provider::{EmbedError, Embedder};
pub use retry::{RetryPolicy, RetryingEmbedder};
