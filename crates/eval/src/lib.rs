pub mod dataset;
pub mod metrics;
pub mod runner;

pub use dataset::{GoldenDataset, GoldenEntry};
pub use metrics::{AggregateMetrics, QueryMetrics};
pub use runner::{EvalHarness, EvalOptions, EvalRunSummary, RunComparison};
