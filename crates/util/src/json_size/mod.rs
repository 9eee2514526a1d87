//! JSON size and shape metrics.
//!
//! `json_size` measures the serialized footprint of a value and backs the
//! per-partition size limit. `node_count` measures its tree shape and is
//! what a patch's length is weighed against when deciding to send a
//! snapshot instead.

mod json;
mod nodes;

pub use json::json_size;
pub use nodes::node_count;
