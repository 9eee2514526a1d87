//! Patch application.
//!
//! [`apply`] never touches its input: the original tree is cloned once and
//! the operations are replayed on the copy in order.

use serde_json::{Map, Value};

use crate::path::{format_path, PathStep};
use crate::types::{ApplyError, DiffOperation};

// ── Public API ────────────────────────────────────────────────────────────

/// Apply `ops` to a copy of `original` and return the result.
///
/// `original` is left unchanged, including when an operation fails.
pub fn apply(original: &Value, ops: &[DiffOperation]) -> Result<Value, ApplyError> {
    let mut doc = original.clone();
    apply_in_place(&mut doc, ops)?;
    Ok(doc)
}

/// Apply `ops` to `doc` in order.
///
/// On error `doc` holds the effects of every operation before the failing
/// one.
pub fn apply_in_place(doc: &mut Value, ops: &[DiffOperation]) -> Result<(), ApplyError> {
    for op in ops {
        apply_op(doc, op)?;
    }
    Ok(())
}

/// Apply a single operation to `doc`.
pub fn apply_op(doc: &mut Value, op: &DiffOperation) -> Result<(), ApplyError> {
    match op {
        DiffOperation::Add { path, value } => apply_add(doc, path, value.clone()),
        DiffOperation::Replace { path, value, .. } => apply_replace(doc, path, value.clone()),
        DiffOperation::Remove { path, .. } => apply_remove(doc, path),
        DiffOperation::ArraySplice {
            path,
            index,
            removed,
            added,
        } => apply_splice(doc, path, *index, removed.len(), added),
    }
}

// ── Path navigation ───────────────────────────────────────────────────────

/// An empty container suited to hold `next`.
fn container_for(next: &PathStep) -> Value {
    match next {
        PathStep::Index(_) => Value::Array(Vec::new()),
        PathStep::Key(_) => Value::Object(Map::new()),
    }
}

/// Walk to the parent of the last step of `path`.
///
/// With `create`, missing object entries and the slot one past the end of an
/// array are filled with an empty container shaped for the following step.
fn parent_mut<'a>(
    doc: &'a mut Value,
    path: &[PathStep],
    create: bool,
) -> Result<&'a mut Value, ApplyError> {
    let parent_len = path.len().saturating_sub(1);
    let mut cur = doc;
    for depth in 0..parent_len {
        let next = &path[depth + 1];
        cur = match (&path[depth], cur) {
            (PathStep::Key(key), Value::Object(map)) => {
                if create {
                    map.entry(key.clone()).or_insert_with(|| container_for(next))
                } else {
                    map.get_mut(key)
                        .ok_or_else(|| ApplyError::NotFound(format_path(&path[..=depth])))?
                }
            }
            (PathStep::Index(idx), Value::Array(arr)) => {
                if create && *idx == arr.len() {
                    arr.push(container_for(next));
                }
                let len = arr.len();
                arr.get_mut(*idx).ok_or_else(|| ApplyError::InvalidIndex {
                    path: format_path(&path[..depth]),
                    index: *idx,
                    len,
                })?
            }
            _ => return Err(ApplyError::NotAContainer(format_path(&path[..depth]))),
        };
    }
    Ok(cur)
}

/// Walk to the node at `path`.
fn target_mut<'a>(doc: &'a mut Value, path: &[PathStep]) -> Result<&'a mut Value, ApplyError> {
    let Some(last) = path.last() else {
        return Ok(doc);
    };
    let parent = parent_mut(doc, path, false)?;
    let missing = || ApplyError::NotFound(format_path(path));
    match (last, parent) {
        (PathStep::Key(key), Value::Object(map)) => map.get_mut(key).ok_or_else(missing),
        (PathStep::Index(idx), Value::Array(arr)) => arr.get_mut(*idx).ok_or_else(missing),
        _ => Err(ApplyError::NotAContainer(format_path(&path[..path.len() - 1]))),
    }
}

// ── Individual operation applicators ─────────────────────────────────────

fn apply_add(doc: &mut Value, path: &[PathStep], value: Value) -> Result<(), ApplyError> {
    let Some(last) = path.last() else {
        *doc = value;
        return Ok(());
    };
    let parent = parent_mut(doc, path, true)?;
    match (last, parent) {
        (PathStep::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (PathStep::Index(idx), Value::Array(arr)) => {
            if *idx > arr.len() {
                return Err(ApplyError::InvalidIndex {
                    path: format_path(&path[..path.len() - 1]),
                    index: *idx,
                    len: arr.len(),
                });
            }
            arr.insert(*idx, value);
            Ok(())
        }
        _ => Err(ApplyError::NotAContainer(format_path(&path[..path.len() - 1]))),
    }
}

fn apply_replace(doc: &mut Value, path: &[PathStep], value: Value) -> Result<(), ApplyError> {
    let Some(last) = path.last() else {
        *doc = value;
        return Ok(());
    };
    let parent = parent_mut(doc, path, true)?;
    match (last, parent) {
        (PathStep::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (PathStep::Index(idx), Value::Array(arr)) => {
            if *idx == arr.len() {
                arr.push(value);
                return Ok(());
            }
            let len = arr.len();
            let slot = arr.get_mut(*idx).ok_or_else(|| ApplyError::InvalidIndex {
                path: format_path(&path[..path.len() - 1]),
                index: *idx,
                len,
            })?;
            *slot = value;
            Ok(())
        }
        _ => Err(ApplyError::NotAContainer(format_path(&path[..path.len() - 1]))),
    }
}

fn apply_remove(doc: &mut Value, path: &[PathStep]) -> Result<(), ApplyError> {
    let Some(last) = path.last() else {
        return Err(ApplyError::RemoveRoot);
    };
    let parent = parent_mut(doc, path, false)?;
    match (last, parent) {
        (PathStep::Key(key), Value::Object(map)) => map
            .shift_remove(key)
            .map(|_| ())
            .ok_or_else(|| ApplyError::NotFound(format_path(path))),
        (PathStep::Index(idx), Value::Array(arr)) => {
            if *idx >= arr.len() {
                return Err(ApplyError::NotFound(format_path(path)));
            }
            arr.remove(*idx);
            Ok(())
        }
        _ => Err(ApplyError::NotAContainer(format_path(&path[..path.len() - 1]))),
    }
}

fn apply_splice(
    doc: &mut Value,
    path: &[PathStep],
    index: usize,
    remove_count: usize,
    added: &[Value],
) -> Result<(), ApplyError> {
    let target = target_mut(doc, path)?;
    let Value::Array(arr) = target else {
        return Err(ApplyError::NotAnArray(format_path(path)));
    };
    let end = index.saturating_add(remove_count);
    if end > arr.len() {
        return Err(ApplyError::InvalidIndex {
            path: format_path(path),
            index: end,
            len: arr.len(),
        });
    }
    arr.splice(index..end, added.iter().cloned());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────
