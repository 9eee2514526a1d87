//! Structural diff: compute the operations that turn one tree into another.

use serde_json::{Map, Value};

use json_bridge_util::{deep_equal, is_prefix};

use crate::path::{Path, PathStep};
use crate::types::{DiffOperation, DiffOptions};

// ── Public API ────────────────────────────────────────────────────────────

/// Generate the ordered operations that transform `old` into `new`.
///
/// Uses [`DiffOptions::default`]. See [`diff_with`].
pub fn diff(old: &Value, new: &Value) -> Vec<DiffOperation> {
    diff_with(old, new, &DiffOptions::default())
}

/// Generate the ordered operations that transform `old` into `new`.
///
/// - Equal trees yield no operations.
/// - Object keys only in `new` yield `Add`, keys only in `old` yield
///   `Remove`, keys in both recurse.
/// - An array whose old contents are a prefix of the new contents yields a
///   single append `ArraySplice`. Other arrays are compared index by index
///   over their common length, followed by one `ArraySplice` for the
///   trailing run that was removed or added.
/// - Mismatched kinds and differing scalars yield `Replace`.
pub fn diff_with(old: &Value, new: &Value, options: &DiffOptions) -> Vec<DiffOperation> {
    let mut ops = Vec::new();
    let mut path = Vec::new();
    diff_at_path(&mut ops, &mut path, old, new, options.max_depth);
    ops
}

// ── Core recursive differ ─────────────────────────────────────────────────

fn diff_at_path(
    ops: &mut Vec<DiffOperation>,
    path: &mut Path,
    old: &Value,
    new: &Value,
    budget: usize,
) {
    if deep_equal(old, new) {
        return;
    }
    match (old, new) {
        (Value::Object(o), Value::Object(n)) if budget > 0 => diff_obj(ops, path, o, n, budget - 1),
        (Value::Array(o), Value::Array(n)) if budget > 0 => diff_arr(ops, path, o, n, budget - 1),
        _ => diff_val(ops, path, old, new),
    }
}

fn diff_val(ops: &mut Vec<DiffOperation>, path: &Path, old: &Value, new: &Value) {
    ops.push(DiffOperation::Replace {
        path: path.clone(),
        old_value: old.clone(),
        value: new.clone(),
    });
}

fn diff_obj(
    ops: &mut Vec<DiffOperation>,
    path: &mut Path,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    budget: usize,
) {
    for (key, old_val) in old {
        if !new.contains_key(key) {
            path.push(PathStep::Key(key.clone()));
            ops.push(DiffOperation::Remove {
                path: path.clone(),
                old_value: old_val.clone(),
            });
            path.pop();
        }
    }
    for (key, new_val) in new {
        path.push(PathStep::Key(key.clone()));
        match old.get(key) {
            None => ops.push(DiffOperation::Add {
                path: path.clone(),
                value: new_val.clone(),
            }),
            Some(old_val) => diff_at_path(ops, path, old_val, new_val, budget),
        }
        path.pop();
    }
}

fn diff_arr(
    ops: &mut Vec<DiffOperation>,
    path: &mut Path,
    old: &[Value],
    new: &[Value],
    budget: usize,
) {
    // Append: the common case for logs, feeds and chat transcripts.
    if is_prefix(old, new) {
        ops.push(DiffOperation::ArraySplice {
            path: path.clone(),
            index: old.len(),
            removed: Vec::new(),
            added: new[old.len()..].to_vec(),
        });
        return;
    }

    let common = old.len().min(new.len());
    for i in 0..common {
        path.push(PathStep::Index(i));
        diff_at_path(ops, path, &old[i], &new[i], budget);
        path.pop();
    }

    if old.len() > common {
        ops.push(DiffOperation::ArraySplice {
            path: path.clone(),
            index: common,
            removed: old[common..].to_vec(),
            added: Vec::new(),
        });
    } else if new.len() > common {
        ops.push(DiffOperation::ArraySplice {
            path: path.clone(),
            index: common,
            removed: Vec::new(),
            added: new[common..].to_vec(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply;
    use serde_json::json;

    fn key(k: &str) -> PathStep {
        PathStep::Key(k.to_string())
    }

    #[test]
    fn diff_equal_docs() {
        assert!(diff(&json!({"a": [1, {"b": 2}]}), &json!({"a": [1, {"b": 2}]})).is_empty());
        assert!(diff(&json!(null), &json!(null)).is_empty());
    }

    #[test]
    fn diff_replace_scalar() {
        let ops = diff(&json!(1), &json!(2));
        assert_eq!(
            ops,
            vec![DiffOperation::Replace {
                path: vec![],
                old_value: json!(1),
                value: json!(2),
            }]
        );
    }

    #[test]
    fn diff_add_key() {
        let ops = diff(&json!({"a": 1}), &json!({"a": 1, "b": 2}));
        assert_eq!(
            ops,
            vec![DiffOperation::Add {
                path: vec![key("b")],
                value: json!(2),
            }]
        );
    }

    #[test]
    fn diff_remove_key() {
        let ops = diff(&json!({"a": 1, "b": 2}), &json!({"a": 1}));
        assert_eq!(
            ops,
            vec![DiffOperation::Remove {
                path: vec![key("b")],
                old_value: json!(2),
            }]
        );
    }

    #[test]
    fn diff_kind_change_is_replace() {
        let ops = diff(&json!({"a": [1]}), &json!({"a": {"0": 1}}));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_name(), "replace");
        assert_eq!(ops[0].path(), &vec![key("a")]);
    }

    #[test]
    fn diff_nested_object() {
        let ops = diff(
            &json!({"user": {"name": "Alice", "age": 30}}),
            &json!({"user": {"name": "Alice", "age": 31}}),
        );
        assert_eq!(
            ops,
            vec![DiffOperation::Replace {
                path: vec![key("user"), key("age")],
                old_value: json!(30),
                value: json!(31),
            }]
        );
    }

    #[test]
    fn diff_array_append() {
        let ops = diff(&json!([1, 2, 3]), &json!([1, 2, 3, 4, 5]));
        assert_eq!(
            ops,
            vec![DiffOperation::ArraySplice {
                path: vec![],
                index: 3,
                removed: vec![],
                added: vec![json!(4), json!(5)],
            }]
        );
    }

    #[test]
    fn diff_array_append_to_empty() {
        let ops = diff(&json!({"log": []}), &json!({"log": ["x"]}));
        assert_eq!(
            ops,
            vec![DiffOperation::ArraySplice {
                path: vec![key("log")],
                index: 0,
                removed: vec![],
                added: vec![json!("x")],
            }]
        );
    }

    #[test]
    fn diff_array_truncate() {
        let ops = diff(&json!([1, 2, 3, 4]), &json!([1, 2]));
        assert_eq!(
            ops,
            vec![DiffOperation::ArraySplice {
                path: vec![],
                index: 2,
                removed: vec![json!(3), json!(4)],
                added: vec![],
            }]
        );
    }

    #[test]
    fn diff_array_change_and_grow() {
        let ops = diff(&json!([1, {"a": 1}]), &json!([1, {"a": 2}, 3]));
        assert_eq!(
            ops,
            vec![
                DiffOperation::Replace {
                    path: vec![PathStep::Index(1), key("a")],
                    old_value: json!(1),
                    value: json!(2),
                },
                DiffOperation::ArraySplice {
                    path: vec![],
                    index: 2,
                    removed: vec![],
                    added: vec![json!(3)],
                },
            ]
        );
    }

    #[test]
    fn diff_array_middle_insert_roundtrip() {
        let src = json!([1, 2, 3]);
        let dst = json!([1, 99, 2, 3]);
        let ops = diff(&src, &dst);
        assert!(ops.iter().all(|op| op.op_name() != "remove"));
        assert_eq!(apply(&src, &ops).unwrap(), dst);
    }

    #[test]
    fn diff_depth_guard_replaces_subtree() {
        let src = json!({"a": {"b": {"c": 1, "d": 2}}});
        let dst = json!({"a": {"b": {"c": 1, "d": 3}}});
        let ops = diff_with(&src, &dst, &DiffOptions { max_depth: 1 });
        assert_eq!(
            ops,
            vec![DiffOperation::Replace {
                path: vec![key("a")],
                old_value: json!({"b": {"c": 1, "d": 2}}),
                value: json!({"b": {"c": 1, "d": 3}}),
            }]
        );
        assert_eq!(apply(&src, &ops).unwrap(), dst);
    }

    #[test]
    fn diff_depth_guard_skips_equal_subtrees() {
        let src = json!({"a": {"b": 1}, "c": 1});
        let dst = json!({"a": {"b": 1}, "c": 2});
        let ops = diff_with(&src, &dst, &DiffOptions { max_depth: 1 });
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path(), &vec![key("c")]);
    }

    #[test]
    fn diff_object_roundtrip() {
        let src = json!({"name": "Alice", "age": 30, "tags": ["a"]});
        let dst = json!({"name": "Bob", "age": 30, "city": "NYC"});
        let ops = diff(&src, &dst);
        assert_eq!(apply(&src, &ops).unwrap(), dst);
    }
}
