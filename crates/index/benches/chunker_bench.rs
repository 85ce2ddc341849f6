use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::path::PathBuf;

use ctx_core::Language;
use index::chunker::{ChunkerConfig, chunk_file};
use index::scanner::FileInfo;

fn synthetic_rust_file(functions: usize) -> String {
  let mut source = String::new();
  for i in 0..functions {
    source.push_str(&format!(
      "/// Handles case {i}.\npub fn handler_{i}(input: &str) -> usize {{\n  let parsed = input.trim().len();\n  parsed * {i}\n}}\n\n"
    ));
  }
  source
}

fn synthetic_markdown(sections: usize) -> String {
  let mut doc = String::from("# Guide\n\n");
  for i in 0..sections {
    doc.push_str(&format!(
      "## Section {i}\n\nSome prose describing part {i} of the system in a couple of sentences that add up.\n\n```rust\nfn example_{i}() {{}}\n```\n\n"
    ));
  }
  doc
}

fn bench_chunker(c: &mut Criterion) {
  let config = ChunkerConfig::default();

  let rust_info = FileInfo {
    path: PathBuf::from("/bench/lib.rs"),
    relative_path: "src/lib.rs".to_string(),
    extension: "rs".to_string(),
    language: Some(Language::Rust),
    file_type: Language::Rust.file_type(),
    size: 0,
    mtime: String::new(),
  };
  let rust_source = synthetic_rust_file(200);

  c.bench_function("chunk_code_200_fns", |b| {
    b.iter(|| chunk_file(black_box(&rust_info), black_box(&rust_source), &config))
  });

  let md_info = FileInfo {
    path: PathBuf::from("/bench/guide.md"),
    relative_path: "docs/guide.md".to_string(),
    extension: "md".to_string(),
    language: Some(Language::Markdown),
    file_type: Language::Markdown.file_type(),
    size: 0,
    mtime: String::new(),
  };
  let md_source = synthetic_markdown(100);

  c.bench_function("chunk_markdown_100_sections", |b| {
    b.iter(|| chunk_file(black_box(&md_info), black_box(&md_source), &config))
  });
}

criterion_group!(benches, bench_chunker);
criterion_main!(benches);
