use serde_json::Value;

/// Counts every node in the tree, containers included.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use json_bridge_util::json_size::node_count;
///
/// assert_eq!(node_count(&json!(1)), 1);
/// assert_eq!(node_count(&json!([1, 2])), 3);
/// assert_eq!(node_count(&json!({"a": {"b": null}})), 3);
/// ```
pub fn node_count(value: &Value) -> usize {
    match value {
        Value::Array(arr) => 1 + arr.iter().map(node_count).sum::<usize>(),
        Value::Object(obj) => 1 + obj.values().map(node_count).sum::<usize>(),
        _ => 1,
    }
}
