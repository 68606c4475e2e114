// Kindred: pairwise similarity engine for a ratings dataset.
//
// This is the library root. Each module corresponds to a major subsystem:
// storage, the two similarity metrics, the batch pipeline that computes
// and persists edges, and the recommendation consumer.

pub mod config;
pub mod db;
pub mod pipeline;
pub mod recommend;
pub mod similarity;
pub mod status;
