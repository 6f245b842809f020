pub mod graph;
pub mod retrieval;
