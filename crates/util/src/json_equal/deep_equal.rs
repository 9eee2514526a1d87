use serde_json::Value;

/// Performs a deep equality check between two JSON values.
///
/// Objects compare by key set and per-key value, independent of key order.
/// Arrays compare element-by-element.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use json_bridge_util::json_equal::deep_equal;
///
/// let a = json!({"foo": [1, 2, 3], "bar": null});
/// let b = json!({"bar": null, "foo": [1, 2, 3]});
/// let c = json!({"foo": [1, 2, 4], "bar": null});
///
/// assert!(deep_equal(&a, &b));
/// assert!(!deep_equal(&a, &c));
/// ```
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(arr_a), Value::Array(arr_b)) => {
            arr_a.len() == arr_b.len() && arr_a.iter().zip(arr_b).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(obj_a), Value::Object(obj_b)) => {
            if obj_a.len() != obj_b.len() {
                return false;
            }
            obj_a
                .iter()
                .all(|(key, val_a)| obj_b.get(key).is_some_and(|val_b| deep_equal(val_a, val_b)))
        }
        _ => false,
    }
}

/// Returns `true` when `prefix` is a structural prefix of `items`.
///
/// Every element of `prefix` must be deep-equal to the element at the same
/// index of `items`. An empty slice is a prefix of every slice.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use json_bridge_util::json_equal::is_prefix;
///
/// let old = [json!(1), json!({"a": 2})];
/// let new = [json!(1), json!({"a": 2}), json!(3)];
///
/// assert!(is_prefix(&old, &new));
/// assert!(!is_prefix(&new, &old));
/// ```
pub fn is_prefix(prefix: &[Value], items: &[Value]) -> bool {
    prefix.len() <= items.len() && prefix.iter().zip(items).all(|(p, v)| deep_equal(p, v))
}
