//! json-bridge-diff - structural diff and patch engine for JSON trees.
//!
//! [`diff`] computes an ordered list of [`DiffOperation`]s between two
//! `serde_json::Value` trees; [`apply`] replays such a list on a copy of the
//! original tree.
//!
//! ```
//! use serde_json::json;
//! use json_bridge_diff::{apply, diff};
//!
//! let old = json!({"title": "draft", "items": [1, 2]});
//! let new = json!({"title": "final", "items": [1, 2, 3]});
//!
//! let ops = diff(&old, &new);
//! assert_eq!(ops.len(), 2);
//! assert_eq!(apply(&old, &ops).unwrap(), new);
//! ```

pub mod apply;
pub mod diff;
pub mod path;
pub mod types;

pub use apply::{apply, apply_in_place, apply_op};
pub use diff::{diff, diff_with};
pub use path::{format_path, parse_pointer, Path, PathStep};
pub use types::{ApplyError, DiffOperation, DiffOptions, DEFAULT_MAX_DEPTH};
