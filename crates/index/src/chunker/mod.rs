//! Dual-track chunker: symbol-aware segmentation for code, heading-aware
//! segmentation for markdown, bounded windows for everything else.

mod code;
mod markdown;

use ctx_core::{ChunkMetadata, FileType, Language, content_hash, estimate_tokens};

use crate::scanner::FileInfo;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
  /// Target ceiling per chunk; oversized segments split on blank lines.
  pub max_tokens: usize,
  /// Segments below this merge forward.
  pub min_chunk_tokens: usize,
  /// Token overlap carried between adjacent prose/window chunks.
  pub overlap_tokens: usize,
  /// Config/data files below this become a single chunk.
  pub single_chunk_threshold: usize,
}

impl Default for ChunkerConfig {
  fn default() -> Self {
    Self {
      max_tokens: 400,
      min_chunk_tokens: 32,
      overlap_tokens: 48,
      single_chunk_threshold: 800,
    }
  }
}

/// A chunk before it gets an identity and an embedding.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
  pub file_path: String,
  pub content: String,
  pub file_type: FileType,
  pub language: Option<Language>,
  /// 1-based inclusive.
  pub start_line: u32,
  pub end_line: u32,
  pub metadata: ChunkMetadata,
  pub content_hash: String,
}

impl ChunkDraft {
  pub(crate) fn new(
    file: &FileInfo,
    content: String,
    start_line: usize,
    end_line: usize,
    metadata: ChunkMetadata,
  ) -> Self {
    let hash = content_hash(&content);
    Self {
      file_path: file.relative_path.clone(),
      content,
      file_type: file.file_type,
      language: file.language,
      start_line: start_line as u32,
      end_line: end_line as u32,
      metadata,
      content_hash: hash,
    }
  }

  pub fn tokens(&self) -> usize {
    estimate_tokens(&self.content)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  Empty,
}

/// Per-file chunking outcome.
#[derive(Debug)]
pub struct FileChunkResult {
  pub skipped: Option<SkipReason>,
  pub warnings: Vec<String>,
  pub chunks: Vec<ChunkDraft>,
}

impl FileChunkResult {
  fn skipped(reason: SkipReason) -> Self {
    Self {
      skipped: Some(reason),
      warnings: Vec::new(),
      chunks: Vec::new(),
    }
  }
}

/// Chunk one file. The track is chosen from the file type.
pub fn chunk_file(file: &FileInfo, content: &str, config: &ChunkerConfig) -> FileChunkResult {
  if content.trim().is_empty() {
    return FileChunkResult::skipped(SkipReason::Empty);
  }

  match file.file_type {
    FileType::Code | FileType::Style => code::chunk_code(file, content, config),
    FileType::Docs => markdown::chunk_markdown(file, content, config),
    FileType::Config | FileType::Data => chunk_windowed(file, content, config),
  }
}

/// Fallback track: one chunk for small files, fixed windows with overlap above
/// the threshold.
fn chunk_windowed(file: &FileInfo, content: &str, config: &ChunkerConfig) -> FileChunkResult {
  let lines: Vec<&str> = content.lines().collect();
  let total_tokens = estimate_tokens(content);

  if total_tokens <= config.single_chunk_threshold {
    let draft = ChunkDraft::new(file, content.to_string(), 1, lines.len().max(1), ChunkMetadata::default());
    return FileChunkResult {
      skipped: None,
      warnings: Vec::new(),
      chunks: vec![draft],
    };
  }

  let mut chunks = Vec::new();
  let mut start = 0usize;
  while start < lines.len() {
    let mut end = start;
    let mut tokens = 0usize;
    while end < lines.len() {
      let line_tokens = estimate_tokens(lines[end]) + 1;
      if tokens + line_tokens > config.max_tokens && end > start {
        break;
      }
      tokens += line_tokens;
      end += 1;
    }

    let chunk_content = lines[start..end].join("\n");
    chunks.push(ChunkDraft::new(file, chunk_content, start + 1, end, ChunkMetadata::default()));

    if end >= lines.len() {
      break;
    }

    // Step back far enough to carry roughly `overlap_tokens` into the next window.
    let mut overlap_lines = 0usize;
    let mut overlap = 0usize;
    while overlap_lines < end - start - 1 && overlap < config.overlap_tokens {
      overlap += estimate_tokens(lines[end - 1 - overlap_lines]) + 1;
      overlap_lines += 1;
    }
    start = end - overlap_lines;
  }

  FileChunkResult {
    skipped: None,
    warnings: Vec::new(),
    chunks,
  }
}
