pub mod chunk;
pub mod config;
pub mod error;
pub mod language;
pub mod project;
pub mod providers;
pub mod tracer;

pub use chunk::{CHARS_PER_TOKEN, Chunk, ChunkMetadata, chunk_id, content_hash, estimate_tokens};
pub use config::{
  Config, EmbeddingConfig, EmbeddingProviderKind, EvalConfig, EvalThresholds, LlmProviderKind, ObservabilityConfig,
  SearchConfig, ctx_dir, db_path, eval_dir, exports_dir,
};
pub use error::{Error, EvalError, Result};
pub use language::{FileType, Language};
pub use project::Project;
pub use providers::{ProviderConfig, ProvidersFile};
pub use tracer::{NoopTracer, SpanHandle, SpanUpdate, TraceHandle, Tracer, Usage, noop_tracer, tracer_from_config};
