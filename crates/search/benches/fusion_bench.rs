use criterion::{Criterion, black_box, criterion_group, criterion_main};
use uuid::Uuid;

use ctx_core::{ChunkMetadata, FileType};
use search::fusion::{RRF_K, rrf_fuse};
use search::types::Hit;

fn ranked_list(seed: u128, len: usize) -> Vec<Hit> {
  (0..len)
    .map(|i| Hit {
      chunk_id: Uuid::from_u128(seed * 10_000 + i as u128 % 600),
      project_id: Uuid::from_u128(seed),
      project_name: format!("project-{seed}"),
      file_path: format!("src/file_{i}.rs"),
      content: String::new(),
      file_type: FileType::Code,
      language: None,
      start_line: 1,
      end_line: 10,
      score: 0.0,
      metadata: ChunkMetadata::default(),
    })
    .collect()
}

fn bench_fusion(c: &mut Criterion) {
  let two_lists = vec![ranked_list(1, 200), ranked_list(1, 200)];
  c.bench_function("rrf_two_lists_200", |b| {
    b.iter(|| rrf_fuse(black_box(&two_lists), RRF_K))
  });

  let many_lists: Vec<Vec<Hit>> = (0..8).map(|p| ranked_list(p, 100)).collect();
  c.bench_function("rrf_eight_projects_100", |b| {
    b.iter(|| rrf_fuse(black_box(&many_lists), RRF_K))
  });
}

criterion_group!(benches, bench_fusion);
criterion_main!(benches);
