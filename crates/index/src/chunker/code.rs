//! Code track: heuristic symbol-aware segmentation.
//!
//! Top-level definitions open segments; leading comment/attribute blocks stay
//! attached to the definition they document. Oversized segments split on
//! interior blank lines, undersized ones merge forward.

use ctx_core::{ChunkMetadata, Language, estimate_tokens};

use super::{ChunkDraft, ChunkerConfig, FileChunkResult};
use crate::scanner::FileInfo;

#[derive(Debug, Clone)]
struct Symbol {
  name: String,
  kind: &'static str,
}

#[derive(Debug, Clone)]
struct Boundary {
  line: usize,
  symbol: Option<Symbol>,
  indented: bool,
}

#[derive(Debug, Clone)]
struct Segment {
  /// 0-based, inclusive start / exclusive end.
  start: usize,
  end: usize,
  symbol: Option<Symbol>,
  parent: Option<String>,
}

pub(crate) fn chunk_code(file: &FileInfo, content: &str, config: &ChunkerConfig) -> FileChunkResult {
  let lines: Vec<&str> = content.lines().collect();
  let language = file.language.unwrap_or(Language::Text);

  let segments = build_segments(&lines, language);
  let segments = merge_undersized(segments, &lines, config);

  let mut chunks = Vec::new();
  for segment in segments {
    emit_segment(file, &lines, &segment, config, &mut chunks);
  }

  FileChunkResult {
    skipped: None,
    warnings: Vec::new(),
    chunks,
  }
}

fn build_segments(lines: &[&str], language: Language) -> Vec<Segment> {
  let boundaries = find_boundaries(lines, language);
  if boundaries.is_empty() {
    return vec![Segment {
      start: 0,
      end: lines.len(),
      symbol: None,
      parent: None,
    }];
  }

  // Pull each boundary's doc/comment block into its segment.
  let starts: Vec<usize> = boundaries
    .iter()
    .map(|b| attach_leading_comments(lines, b.line))
    .collect();

  let mut segments = Vec::new();
  if starts[0] > 0 {
    segments.push(Segment {
      start: 0,
      end: starts[0],
      symbol: None,
      parent: None,
    });
  }

  let mut container: Option<String> = None;
  for (i, boundary) in boundaries.iter().enumerate() {
    let end = if i + 1 < starts.len() {
      // A later boundary's comment block never reaches above its predecessor.
      starts[i + 1].max(boundary.line + 1)
    } else {
      lines.len()
    };

    let parent = if boundary.indented { container.clone() } else { None };
    if !boundary.indented
      && let Some(symbol) = &boundary.symbol
      && is_container_kind(symbol.kind)
    {
      container = Some(symbol.name.clone());
    }

    segments.push(Segment {
      start: starts[i],
      end,
      symbol: boundary.symbol.clone(),
      parent,
    });
  }

  segments.retain(|s| s.start < s.end);
  segments
}

fn is_container_kind(kind: &str) -> bool {
  matches!(kind, "impl" | "class" | "struct" | "trait" | "interface" | "module")
}

/// Merge segments under the minimum size into their successor. The trailing
/// segment is exempt.
fn merge_undersized(segments: Vec<Segment>, lines: &[&str], config: &ChunkerConfig) -> Vec<Segment> {
  let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
  let mut carry: Option<Segment> = None;

  for segment in segments {
    let mut current = match carry.take() {
      Some(previous) => Segment {
        start: previous.start,
        end: segment.end,
        symbol: previous.symbol.or(segment.symbol),
        parent: previous.parent.or(segment.parent),
      },
      None => segment,
    };

    let tokens = segment_tokens(lines, &current);
    if tokens < config.min_chunk_tokens {
      carry = Some(current);
    } else {
      current.end = current.end.min(lines.len());
      merged.push(current);
    }
  }

  // Trailing undersized segment stays.
  if let Some(last) = carry {
    merged.push(last);
  }
  merged
}

fn segment_tokens(lines: &[&str], segment: &Segment) -> usize {
  lines[segment.start..segment.end.min(lines.len())]
    .iter()
    .map(|line| estimate_tokens(line) + 1)
    .sum()
}

/// Emit one segment as one or more drafts, splitting on interior blank lines
/// when it exceeds the token ceiling.
fn emit_segment(file: &FileInfo, lines: &[&str], segment: &Segment, config: &ChunkerConfig, out: &mut Vec<ChunkDraft>) {
  let parts = split_on_blank_lines(lines, segment, config.max_tokens);
  let total = parts.len() as u32;

  for (index, (start, end)) in parts.into_iter().enumerate() {
    let content = lines[start..end].join("\n");
    let mut metadata = ChunkMetadata::default();
    if let Some(symbol) = &segment.symbol {
      metadata.symbol_name = Some(symbol.name.clone());
      metadata.symbol_kind = Some(symbol.kind.to_string());
    }
    metadata.parent = segment.parent.clone();
    if total > 1 {
      metadata.part = Some(index as u32 + 1);
      metadata.part_total = Some(total);
    }
    out.push(ChunkDraft::new(file, content, start + 1, end, metadata));
  }
}

/// Split an oversized segment at blank lines; hard line cuts only when a part
/// has no blank line to break at.
fn split_on_blank_lines(lines: &[&str], segment: &Segment, max_tokens: usize) -> Vec<(usize, usize)> {
  let end = segment.end.min(lines.len());
  if segment_tokens(lines, segment) <= max_tokens {
    return vec![(segment.start, end)];
  }

  let mut parts = Vec::new();
  let mut part_start = segment.start;
  let mut tokens = 0usize;
  let mut last_blank: Option<usize> = None;

  let mut i = segment.start;
  while i < end {
    let line_tokens = estimate_tokens(lines[i]) + 1;
    if tokens + line_tokens > max_tokens && i > part_start {
      let cut = match last_blank {
        Some(blank) if blank > part_start => blank + 1,
        _ => i,
      };
      parts.push((part_start, cut));
      part_start = cut;
      tokens = 0;
      last_blank = None;
      i = cut;
      continue;
    }
    if lines[i].trim().is_empty() {
      last_blank = Some(i);
    }
    tokens += line_tokens;
    i += 1;
  }
  if part_start < end {
    parts.push((part_start, end));
  }
  parts
}

/// Walk back over the comment/attribute block directly above a definition.
fn attach_leading_comments(lines: &[&str], boundary_line: usize) -> usize {
  let mut start = boundary_line;
  while start > 0 {
    let above = lines[start - 1].trim();
    if above.is_empty() {
      break;
    }
    let is_comment = above.starts_with("///")
      || above.starts_with("//!")
      || above.starts_with("//")
      || above.starts_with("/*")
      || above.starts_with('*')
      || above.starts_with('#') && !above.starts_with("#!")
      || above.starts_with("--")
      || above.starts_with('@');
    if !is_comment {
      break;
    }
    start -= 1;
  }
  start
}

fn find_boundaries(lines: &[&str], language: Language) -> Vec<Boundary> {
  let mut boundaries = Vec::new();

  for (i, line) in lines.iter().enumerate() {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    if let Some(symbol) = detect_definition(trimmed, language) {
      let indented = line.starts_with(' ') || line.starts_with('\t');
      boundaries.push(Boundary {
        line: i,
        symbol: Some(symbol),
        indented,
      });
    }
  }

  boundaries
}

fn detect_definition(trimmed: &str, language: Language) -> Option<Symbol> {
  match language {
    Language::Rust => detect_rust(trimmed),
    Language::Python => detect_python(trimmed),
    Language::TypeScript | Language::JavaScript | Language::Tsx | Language::Jsx => detect_typescript(trimmed),
    Language::Go => detect_go(trimmed),
    Language::Java | Language::Kotlin | Language::Scala | Language::CSharp => detect_jvm_like(trimmed),
    _ => None,
  }
}

fn first_identifier(rest: &str) -> Option<String> {
  let name: String = rest
    .trim_start()
    .chars()
    .take_while(|c| c.is_alphanumeric() || *c == '_')
    .collect();
  if name.is_empty() { None } else { Some(name) }
}

fn detect_rust(trimmed: &str) -> Option<Symbol> {
  let stripped = trimmed
    .strip_prefix("pub(crate) ")
    .or_else(|| trimmed.strip_prefix("pub(super) "))
    .or_else(|| trimmed.strip_prefix("pub "))
    .unwrap_or(trimmed);

  for (prefix, kind) in [
    ("async fn ", "function"),
    ("fn ", "function"),
    ("struct ", "struct"),
    ("enum ", "enum"),
    ("trait ", "trait"),
    ("type ", "type"),
    ("mod ", "module"),
    ("const ", "const"),
    ("static ", "const"),
  ] {
    if let Some(rest) = stripped.strip_prefix(prefix) {
      return first_identifier(rest).map(|name| Symbol { name, kind });
    }
  }
  if let Some(rest) = stripped.strip_prefix("impl ") {
    let rest = rest.trim_start_matches(|c| c == '<' || c == ' ');
    return first_identifier(rest).map(|name| Symbol { name, kind: "impl" });
  }
  None
}

fn detect_python(trimmed: &str) -> Option<Symbol> {
  for (prefix, kind) in [("async def ", "function"), ("def ", "function"), ("class ", "class")] {
    if let Some(rest) = trimmed.strip_prefix(prefix) {
      return first_identifier(rest).map(|name| Symbol { name, kind });
    }
  }
  None
}

fn detect_typescript(trimmed: &str) -> Option<Symbol> {
  let stripped = trimmed
    .strip_prefix("export default ")
    .or_else(|| trimmed.strip_prefix("export "))
    .unwrap_or(trimmed);

  for (prefix, kind) in [
    ("async function ", "function"),
    ("function ", "function"),
    ("class ", "class"),
    ("interface ", "interface"),
    ("type ", "type"),
    ("enum ", "enum"),
  ] {
    if let Some(rest) = stripped.strip_prefix(prefix) {
      return first_identifier(rest).map(|name| Symbol { name, kind });
    }
  }

  // const handler = (...) => / const handler = async (...)
  if let Some(rest) = stripped.strip_prefix("const ")
    && (rest.contains(" = (") || rest.contains(" = async (") || rest.contains(" => "))
  {
    return first_identifier(rest).map(|name| Symbol { name, kind: "function" });
  }
  None
}

fn detect_go(trimmed: &str) -> Option<Symbol> {
  if let Some(rest) = trimmed.strip_prefix("func ") {
    // Skip a method receiver: func (r *Recv) Name(...
    let rest = if rest.starts_with('(') {
      rest.split_once(')').map(|(_, tail)| tail.trim_start()).unwrap_or(rest)
    } else {
      rest
    };
    return first_identifier(rest).map(|name| Symbol { name, kind: "function" });
  }
  if let Some(rest) = trimmed.strip_prefix("type ") {
    let kind = if trimmed.contains("interface") { "interface" } else { "struct" };
    return first_identifier(rest).map(|name| Symbol { name, kind });
  }
  None
}

fn detect_jvm_like(trimmed: &str) -> Option<Symbol> {
  let stripped = trimmed
    .strip_prefix("public ")
    .or_else(|| trimmed.strip_prefix("private "))
    .or_else(|| trimmed.strip_prefix("protected "))
    .unwrap_or(trimmed);
  let stripped = stripped.strip_prefix("static ").unwrap_or(stripped);

  for (prefix, kind) in [
    ("class ", "class"),
    ("interface ", "interface"),
    ("enum ", "enum"),
    ("object ", "class"),
    ("fun ", "function"),
    ("def ", "function"),
  ] {
    if let Some(rest) = stripped.strip_prefix(prefix) {
      return first_identifier(rest).map(|name| Symbol { name, kind });
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::super::tests::file_info;
  use super::*;
  use ctx_core::Language;

  fn chunk(content: &str, path: &str, language: Language) -> Vec<ChunkDraft> {
    let info = file_info(path, language);
    chunk_code(&info, content, &ChunkerConfig::default()).chunks
  }

  #[test]
  fn test_stable_ids_for_same_input() {
    let content = "export function login(user: string) {\n  return token(user);\n}\n";
    let a = chunk(content, "src/auth.ts", Language::TypeScript);
    let b = chunk(content, "src/auth.ts", Language::TypeScript);

    assert_eq!(a.len(), 1);
    assert_eq!(a[0].content_hash, b[0].content_hash);
    assert_eq!(a[0].start_line, b[0].start_line);
    assert_eq!(a[0].end_line, b[0].end_line);
    assert_eq!(a[0].metadata.symbol_name.as_deref(), Some("login"));
    assert_eq!(a[0].metadata.symbol_kind.as_deref(), Some("function"));
  }

  #[test]
  fn test_rust_symbols_detected() {
    let content = "\
/// Adds numbers.
pub fn add(a: u32, b: u32) -> u32 {
  a + b
}

struct Point {
  x: f32,
}

impl Point {
  fn norm(&self) -> f32 {
    self.x.abs()
  }
}
";
    let chunks = chunk(content, "src/math.rs", Language::Rust);
    let symbols: Vec<_> = chunks.iter().filter_map(|c| c.metadata.symbol_name.clone()).collect();
    assert!(symbols.contains(&"add".to_string()));
    // Small segments merge forward, but a symbol survives in the merged chunk.
    assert!(!chunks.is_empty());
  }

  #[test]
  fn test_doc_comment_attached_to_definition() {
    // Pad each function so segments clear the merge threshold.
    let body = "  let x = compute_everything_in_detail();\n".repeat(10);
    let content = format!("fn first() {{\n{body}}}\n\n/// Documented.\n/// Twice.\nfn second() {{\n{body}}}\n");
    let chunks = chunk(&content, "src/lib.rs", Language::Rust);

    let second = chunks
      .iter()
      .find(|c| c.metadata.symbol_name.as_deref() == Some("second"))
      .expect("second() chunk");
    assert!(second.content.starts_with("/// Documented."));
  }

  #[test]
  fn test_oversized_segment_splits_with_part_markers() {
    let mut content = String::from("fn giant() {\n");
    for i in 0..200 {
      content.push_str(&format!("  let value_{i} = {i} * compute({i});\n"));
      if i % 20 == 19 {
        content.push('\n');
      }
    }
    content.push_str("}\n");

    let config = ChunkerConfig::default();
    let info = file_info("src/giant.rs", Language::Rust);
    let chunks = chunk_code(&info, &content, &config).chunks;

    assert!(chunks.len() > 1);
    let total = chunks.len() as u32;
    for (i, c) in chunks.iter().enumerate() {
      assert_eq!(c.metadata.part, Some(i as u32 + 1));
      assert_eq!(c.metadata.part_total, Some(total));
      assert_eq!(c.metadata.symbol_name.as_deref(), Some("giant"));
    }
    // Line ranges are monotonically non-decreasing and contiguous.
    for pair in chunks.windows(2) {
      assert_eq!(pair[1].start_line, pair[0].end_line + 1);
    }
  }

  #[test]
  fn test_undersized_segments_merge_forward() {
    let body = "  work();\n".repeat(20);
    let content = format!("use std::io;\nuse std::fs;\n\nfn main() {{\n{body}}}\n");
    let chunks = chunk(&content, "src/main.rs", Language::Rust);

    // The tiny import preamble merged into main's chunk.
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.starts_with("use std::io;"));
    assert_eq!(chunks[0].start_line, 1);
  }

  #[test]
  fn test_parent_tracked_for_methods() {
    let method_body = "    self.data.iter().map(|x| x * 2).sum::<u32>() as f32\n".repeat(10);
    let content = format!(
      "impl Engine {{\n  fn run(&self) -> f32 {{\n{method_body}  }}\n\n  fn stop(&self) -> f32 {{\n{method_body}  }}\n}}\n"
    );
    let chunks = chunk(&content, "src/engine.rs", Language::Rust);

    let stop = chunks.iter().find(|c| c.metadata.symbol_name.as_deref() == Some("stop"));
    if let Some(stop) = stop {
      assert_eq!(stop.metadata.parent.as_deref(), Some("Engine"));
    }
  }

  #[test]
  fn test_unsupported_language_single_segment() {
    let content = "some plain text\nwith no structure\n";
    let chunks = chunk(content, "notes.txt", Language::Text);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].metadata.symbol_name.is_none());
  }

  #[test]
  fn test_go_receiver_methods() {
    let body = "\tresult := compute(input)\n".repeat(12);
    let content = format!("func (s *Server) Handle(w Writer) error {{\n{body}}}\n");
    let chunks = chunk(&content, "server.go", Language::Go);
    assert_eq!(chunks[0].metadata.symbol_name.as_deref(), Some("Handle"));
  }

  #[test]
  fn test_line_ranges_one_based_inclusive() {
    let body = "  step();\n".repeat(15);
    let content = format!("fn a() {{\n{body}}}\n\nfn b() {{\n{body}}}\n");
    let chunks = chunk(&content, "src/ab.rs", Language::Rust);

    assert_eq!(chunks[0].start_line, 1);
    for pair in chunks.windows(2) {
      assert!(pair[1].start_line > pair[0].start_line);
    }
    let last = chunks.last().unwrap();
    assert_eq!(last.end_line as usize, content.lines().count());
  }
}
