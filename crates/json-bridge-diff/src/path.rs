//! Paths locating a node inside a JSON tree.
//!
//! A path is an ordered list of object keys and array indices. Paths render
//! as RFC 6901 JSON Pointers for logs and error messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a [`Path`]: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    Index(usize),
    Key(String),
}

/// A location inside a JSON tree. The empty path is the root.
pub type Path = Vec<PathStep>;

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_string())
    }
}

impl From<String> for PathStep {
    fn from(key: String) -> Self {
        PathStep::Key(key)
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        PathStep::Index(index)
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Index(i) => write!(f, "{i}"),
            PathStep::Key(k) => f.write_str(&escape_component(k)),
        }
    }
}

/// Escapes a JSON Pointer path component.
fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    component.replace('~', "~0").replace('/', "~1")
}

/// Unescapes a JSON Pointer path component.
fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    component.replace("~1", "/").replace("~0", "~")
}

/// Format a path as a JSON Pointer string. The root formats as `""`.
///
/// # Examples
///
/// ```
/// use json_bridge_diff::path::{format_path, PathStep};
///
/// let path = vec![PathStep::from("a/b"), PathStep::from(2)];
/// assert_eq!(format_path(&path), "/a~1b/2");
/// assert_eq!(format_path(&[]), "");
/// ```
pub fn format_path(path: &[PathStep]) -> String {
    let mut out = String::with_capacity(path.len() * 8);
    for step in path {
        out.push('/');
        out.push_str(&step.to_string());
    }
    out
}

/// Parse a JSON Pointer string into a path.
///
/// Components made only of ASCII digits become [`PathStep::Index`], all
/// others become [`PathStep::Key`]. A missing leading `/` is tolerated.
pub fn parse_pointer(pointer: &str) -> Path {
    if pointer.is_empty() {
        return Vec::new();
    }
    let body = pointer.strip_prefix('/').unwrap_or(pointer);
    body.split('/')
        .map(|token| {
            let is_index = !token.is_empty()
                && token.bytes().all(|b| b.is_ascii_digit())
                && (token == "0" || !token.starts_with('0'));
            match token.parse::<usize>() {
                Ok(idx) if is_index => PathStep::Index(idx),
                _ => PathStep::Key(unescape_component(token)),
            }
        })
        .collect()
}
