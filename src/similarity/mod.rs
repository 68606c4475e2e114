// Similarity computation — pure metrics and candidate-pair scoring.
//
// Nothing in this module touches storage or blocks; the pipeline feeds it
// typed rows and gets back thresholded edges.

pub mod candidates;
pub mod metric;
