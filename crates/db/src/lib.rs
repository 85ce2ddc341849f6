pub mod blob;
pub mod chunks;
pub mod evals;
pub mod migrations;
pub mod projects;
pub mod store;

pub use blob::{blob_to_vec, vec_to_blob};
pub use chunks::ChunkBatches;
pub use evals::{EvalResultRecord, EvalRunRecord};
pub use store::{Store, StoreStats};
