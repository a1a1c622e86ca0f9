//! Policy sampler: picks a random audit sample of applications per batch,
//! never picking the same policy twice across batches.

pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod recorder;
pub mod rng;
pub mod sampler;
pub mod store;
pub mod synth;
pub mod types;
