//! json-bridge-util - Utility functions for json-bridge
//!
//! Tree equality, size metrics and a bounded memoizer shared by the diff
//! engine and the bridge runtime.

pub mod json_equal;
pub mod json_size;
pub mod memoize;

// Re-exports for convenience
pub use json_equal::{deep_equal, is_prefix};
pub use json_size::{json_size, node_count};
pub use memoize::{memoize_last, MemoizeLast};
