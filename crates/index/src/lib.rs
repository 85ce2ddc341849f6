pub mod chunker;
pub mod lock;
pub mod pipeline;
pub mod scanner;

pub use chunker::{ChunkDraft, ChunkerConfig, FileChunkResult, SkipReason, chunk_file};
pub use lock::ProjectLock;
pub use pipeline::{IndexOptions, IndexReport, IndexingPipeline, PipelineEvent, Stage};
pub use scanner::{FileInfo, ScanOptions, ScanResult, ScanStats, scan};
