//! Markdown track: headings partition the file, prose accumulates up to the
//! token ceiling with overlap, fenced code blocks become their own chunks.

use ctx_core::{ChunkMetadata, Language, estimate_tokens};

use super::{ChunkDraft, ChunkerConfig, FileChunkResult};
use crate::scanner::FileInfo;

#[derive(Debug)]
struct HeadingStack {
  /// (level, text)
  stack: Vec<(usize, String)>,
}

impl HeadingStack {
  fn new() -> Self {
    Self { stack: Vec::new() }
  }

  fn push(&mut self, level: usize, text: &str) {
    while self.stack.last().is_some_and(|(l, _)| *l >= level) {
      self.stack.pop();
    }
    self.stack.push((level, text.to_string()));
  }

  fn path(&self) -> Option<String> {
    if self.stack.is_empty() {
      None
    } else {
      Some(
        self
          .stack
          .iter()
          .map(|(_, text)| text.as_str())
          .collect::<Vec<_>>()
          .join(" > "),
      )
    }
  }

  /// Everything above the innermost heading.
  fn parent_path(&self) -> Option<String> {
    if self.stack.len() < 2 {
      None
    } else {
      Some(
        self.stack[..self.stack.len() - 1]
          .iter()
          .map(|(_, text)| text.as_str())
          .collect::<Vec<_>>()
          .join(" > "),
      )
    }
  }
}

/// Accumulating prose buffer with original line indices.
struct ProseBuffer {
  /// (0-based line index, text)
  lines: Vec<(usize, String)>,
  heading: Option<String>,
  parent: Option<String>,
}

impl ProseBuffer {
  fn new() -> Self {
    Self {
      lines: Vec::new(),
      heading: None,
      parent: None,
    }
  }

  fn tokens(&self) -> usize {
    self.lines.iter().map(|(_, text)| estimate_tokens(text) + 1).sum()
  }

  fn is_blank(&self) -> bool {
    self.lines.iter().all(|(_, text)| text.trim().is_empty())
  }
}

pub(crate) fn chunk_markdown(file: &FileInfo, content: &str, config: &ChunkerConfig) -> FileChunkResult {
  let lines: Vec<&str> = content.lines().collect();
  let mut warnings = Vec::new();
  let mut chunks: Vec<ChunkDraft> = Vec::new();

  let mut headings = HeadingStack::new();
  let mut prose = ProseBuffer::new();

  let mut i = 0usize;
  while i < lines.len() {
    let line = lines[i];
    let trimmed = line.trim();

    if let Some((level, text)) = parse_heading(trimmed) {
      flush_prose(file, &mut prose, &mut chunks, config);
      headings.push(level, text);
      prose.heading = headings.path();
      prose.parent = headings.parent_path();
      prose.lines.push((i, line.to_string()));
      i += 1;
      continue;
    }

    if let Some(fence) = parse_fence_open(trimmed) {
      flush_prose(file, &mut prose, &mut chunks, config);

      let fence_start = i;
      let mut fence_end = None;
      for (j, candidate) in lines.iter().enumerate().skip(i + 1) {
        if is_fence_close(candidate.trim(), fence.marker) {
          fence_end = Some(j);
          break;
        }
      }

      let end = match fence_end {
        Some(end) => end,
        None => {
          warnings.push(format!("unclosed code fence at line {}", fence_start + 1));
          lines.len() - 1
        }
      };

      let block = lines[fence_start..=end].join("\n");
      let mut metadata = ChunkMetadata {
        heading: headings.path(),
        ..Default::default()
      };
      metadata.symbol_kind = Some("code-block".to_string());
      let mut draft = ChunkDraft::new(file, block, fence_start + 1, end + 1, metadata);
      // Preserve the fenced language when it names one we know.
      if let Some(lang) = fence.info.and_then(Language::from_str_loose) {
        draft.language = Some(lang);
      }
      chunks.push(draft);

      i = end + 1;
      continue;
    }

    // Plain prose line.
    if prose.lines.is_empty() {
      prose.heading = headings.path();
      prose.parent = headings.parent_path();
    }
    prose.lines.push((i, line.to_string()));

    if prose.tokens() >= config.max_tokens {
      flush_prose_with_overlap(file, &mut prose, &mut chunks, config);
    }
    i += 1;
  }

  flush_prose(file, &mut prose, &mut chunks, config);

  let chunks = merge_small_siblings(chunks, config);

  FileChunkResult {
    skipped: None,
    warnings,
    chunks,
  }
}

struct FenceOpen<'a> {
  marker: char,
  info: Option<&'a str>,
}

fn parse_heading(trimmed: &str) -> Option<(usize, &str)> {
  if !trimmed.starts_with('#') {
    return None;
  }
  let level = trimmed.chars().take_while(|c| *c == '#').count();
  if level > 6 {
    return None;
  }
  let rest = &trimmed[level..];
  if rest.is_empty() || rest.starts_with(' ') {
    Some((level, rest.trim()))
  } else {
    None
  }
}

fn parse_fence_open(trimmed: &str) -> Option<FenceOpen<'_>> {
  for (fence, marker) in [("```", '`'), ("~~~", '~')] {
    if let Some(rest) = trimmed.strip_prefix(fence) {
      let info = rest.trim();
      return Some(FenceOpen {
        marker,
        info: if info.is_empty() { None } else { Some(info) },
      });
    }
  }
  None
}

fn is_fence_close(trimmed: &str, marker: char) -> bool {
  trimmed.len() >= 3 && trimmed.chars().all(|c| c == marker)
}

fn buffer_to_draft(file: &FileInfo, prose: &ProseBuffer) -> ChunkDraft {
  let start = prose.lines.first().map(|(i, _)| *i).unwrap_or(0);
  let end = prose.lines.last().map(|(i, _)| *i).unwrap_or(start);
  let content = prose
    .lines
    .iter()
    .map(|(_, text)| text.as_str())
    .collect::<Vec<_>>()
    .join("\n");
  let metadata = ChunkMetadata {
    heading: prose.heading.clone(),
    parent: prose.parent.clone(),
    ..Default::default()
  };
  ChunkDraft::new(file, content, start + 1, end + 1, metadata)
}

fn flush_prose(file: &FileInfo, prose: &mut ProseBuffer, chunks: &mut Vec<ChunkDraft>, _config: &ChunkerConfig) {
  if !prose.lines.is_empty() && !prose.is_blank() {
    chunks.push(buffer_to_draft(file, prose));
  }
  *prose = ProseBuffer::new();
}

/// Flush a full buffer but seed the next one with the trailing lines worth
/// roughly `overlap_tokens`, so adjacent chunks share context.
fn flush_prose_with_overlap(file: &FileInfo, prose: &mut ProseBuffer, chunks: &mut Vec<ChunkDraft>, config: &ChunkerConfig) {
  if prose.lines.is_empty() || prose.is_blank() {
    *prose = ProseBuffer::new();
    return;
  }
  chunks.push(buffer_to_draft(file, prose));

  let mut overlap_lines = Vec::new();
  let mut tokens = 0usize;
  for (index, text) in prose.lines.iter().rev() {
    let line_tokens = estimate_tokens(text) + 1;
    if tokens + line_tokens > config.overlap_tokens {
      break;
    }
    tokens += line_tokens;
    overlap_lines.push((*index, text.clone()));
  }
  overlap_lines.reverse();

  // Never carry the whole buffer; that would stall the scan position.
  if overlap_lines.len() >= prose.lines.len() {
    overlap_lines.clear();
  }

  let heading = prose.heading.clone();
  let parent = prose.parent.clone();
  *prose = ProseBuffer::new();
  prose.lines = overlap_lines;
  prose.heading = heading;
  prose.parent = parent;
}

/// Merge undersized prose chunks into the following chunk when both sit under
/// the same parent heading.
fn merge_small_siblings(chunks: Vec<ChunkDraft>, config: &ChunkerConfig) -> Vec<ChunkDraft> {
  let mut merged: Vec<ChunkDraft> = Vec::with_capacity(chunks.len());

  for chunk in chunks {
    let mergeable = merged.last().is_some_and(|previous: &ChunkDraft| {
      previous.metadata.symbol_kind.is_none()
        && chunk.metadata.symbol_kind.is_none()
        && previous.tokens() < config.min_chunk_tokens
        && previous.metadata.parent == chunk.metadata.parent
        && previous.metadata.parent.is_some()
    });

    if mergeable && let Some(previous) = merged.pop() {
      let content = format!("{}\n{}", previous.content, chunk.content);
      let content_hash = ctx_core::content_hash(&content);
      merged.push(ChunkDraft {
        file_path: previous.file_path,
        content,
        file_type: previous.file_type,
        language: previous.language,
        start_line: previous.start_line,
        end_line: chunk.end_line,
        metadata: ChunkMetadata {
          heading: chunk.metadata.heading.clone(),
          parent: chunk.metadata.parent.clone(),
          ..Default::default()
        },
        content_hash,
      });
    } else {
      merged.push(chunk);
    }
  }

  merged
}
