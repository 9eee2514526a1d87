//! Core types for the diff engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::path::{format_path, Path};

// ── Error ─────────────────────────────────────────────────────────────────

/// Failure to apply an operation to a tree. Paths are JSON Pointers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApplyError {
    #[error("path not found: {0:?}")]
    NotFound(String),
    #[error("index {index} out of bounds (len {len}) at {path:?}")]
    InvalidIndex {
        path: String,
        index: usize,
        len: usize,
    },
    #[error("value at {0:?} is not a container")]
    NotAContainer(String),
    #[error("value at {0:?} is not an array")]
    NotAnArray(String),
    #[error("cannot remove the document root")]
    RemoveRoot,
}

// ── DiffOperation ─────────────────────────────────────────────────────────

/// One change between two trees.
///
/// A diff is an ordered `Vec<DiffOperation>`; each operation assumes every
/// earlier one has already been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffOperation {
    Add {
        path: Path,
        value: Value,
    },
    Remove {
        path: Path,
        old_value: Value,
    },
    Replace {
        path: Path,
        old_value: Value,
        value: Value,
    },
    ArraySplice {
        path: Path,
        index: usize,
        removed: Vec<Value>,
        added: Vec<Value>,
    },
}

impl DiffOperation {
    /// Returns the operation name as it appears in the serialized `op` tag.
    pub fn op_name(&self) -> &'static str {
        match self {
            DiffOperation::Add { .. } => "add",
            DiffOperation::Remove { .. } => "remove",
            DiffOperation::Replace { .. } => "replace",
            DiffOperation::ArraySplice { .. } => "array_splice",
        }
    }

    /// Returns the path of the operation.
    pub fn path(&self) -> &Path {
        match self {
            DiffOperation::Add { path, .. }
            | DiffOperation::Remove { path, .. }
            | DiffOperation::Replace { path, .. }
            | DiffOperation::ArraySplice { path, .. } => path,
        }
    }
}

impl fmt::Display for DiffOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pointer = format_path(self.path());
        match self {
            DiffOperation::ArraySplice {
                index,
                removed,
                added,
                ..
            } => write!(
                f,
                "{} {pointer:?} @{index} -{} +{}",
                self.op_name(),
                removed.len(),
                added.len()
            ),
            _ => write!(f, "{} {pointer:?}", self.op_name()),
        }
    }
}

// ── Options ───────────────────────────────────────────────────────────────

/// Default recursion budget for [`crate::diff_with`].
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Options for [`crate::diff_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Containers nested deeper than this are compared as opaque values:
    /// equal subtrees produce nothing, differing ones a single `Replace`.
    pub max_depth: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
