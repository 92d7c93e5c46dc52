//! Edge and vertex model shared by every backend.

mod types;

pub use types::{Edge, GraphDegree, NodeId, row_to_edge, validate_edge};
