//! Reading and writing values at a [`Path`] inside a `serde_json::Value` tree.
//!
//! Reads never fail: a missing node is `None`. Writes never fail either:
//! intermediate containers are created on the way down.

use std::fmt;

use serde_json::{Map, Value};

use crate::path::Path;
use crate::{index_of, within_padding};

/// A direct value or an updater run against the current value.
pub enum SetAction {
    Value(Value),
    Update(Box<dyn FnOnce(Option<&Value>) -> Value>),
}

impl SetAction {
    pub fn update(f: impl FnOnce(Option<&Value>) -> Value + 'static) -> Self {
        SetAction::Update(Box::new(f))
    }

    /// Produce the value to write, given the value currently stored.
    pub fn resolve(self, current: Option<&Value>) -> Value {
        match self {
            SetAction::Value(value) => value,
            SetAction::Update(f) => f(current),
        }
    }
}

impl From<Value> for SetAction {
    fn from(value: Value) -> Self {
        SetAction::Value(value)
    }
}

impl fmt::Debug for SetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetAction::Value(value) => f.debug_tuple("Value").field(value).finish(),
            SetAction::Update(_) => f.write_str("Update(..)"),
        }
    }
}

/// One step down from `value`.
///
/// Arrays are indexed by canonical index segments; objects by key (an
/// index segment is an ordinary key there).
pub fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Array(items) => items.get(index_of(segment)?),
        Value::Object(map) => map.get(segment),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Array(items) => items.get_mut(index_of(segment)?),
        Value::Object(map) => map.get_mut(segment),
        _ => None,
    }
}

/// Get the value at `path`, or `None` if any step is missing.
///
/// ```
/// use formstate_path::{deep_get, path};
/// use serde_json::json;
///
/// let doc = json!({"a": {"b": [1, 2, 3]}});
/// assert_eq!(deep_get(&doc, &path!["a", "b", 1]), Some(&json!(2)));
/// assert_eq!(deep_get(&doc, &path!["a", "x"]), None);
/// ```
pub fn deep_get<'a>(tree: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = tree;
    for segment in path.segments() {
        current = child(current, segment)?;
    }
    Some(current)
}

/// Mutable counterpart of [`deep_get`].
pub fn deep_get_mut<'a>(tree: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut current = tree;
    for segment in path.segments() {
        current = child_mut(current, segment)?;
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate containers.
///
/// A missing or scalar intermediate becomes an array when the segment
/// written into it is an index, otherwise an object. Writing past the end
/// of an array pads it with `null` holes, up to [`MAX_INDEX_PADDING`]
/// items; an index further out is stored as an object key instead.
/// Writing at the root replaces the whole tree.
///
/// [`MAX_INDEX_PADDING`]: crate::MAX_INDEX_PADDING
///
/// ```
/// use formstate_path::{deep_set, path};
/// use serde_json::json;
///
/// let mut doc = json!({"a": 1});
/// deep_set(&mut doc, &path!["b", "list", 2, "x"], json!(true));
/// assert_eq!(doc, json!({"a": 1, "b": {"list": [null, null, {"x": true}]}}));
/// ```
pub fn deep_set(tree: &mut Value, path: &Path, value: Value) {
    let mut current = tree;
    for segment in path.segments() {
        current = slot(current, segment);
    }
    *current = value;
}

/// Write the result of `action` at `path`.
///
/// An updater sees the value stored at `path` before the write.
pub fn deep_update(tree: &mut Value, path: &Path, action: SetAction) {
    let value = match action {
        SetAction::Value(value) => value,
        update => update.resolve(deep_get(tree, path)),
    };
    deep_set(tree, path, value);
}

/// Remove the value at `path` and return it.
///
/// Object keys are removed outright. Array elements are replaced with a
/// `null` hole so that sibling indices stay stable. Removing the root
/// leaves `null` behind.
pub fn deep_remove(tree: &mut Value, path: &Path) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::take(tree));
    };
    let mut parent = tree;
    for segment in parents {
        parent = child_mut(parent, segment)?;
    }
    match parent {
        Value::Object(map) => map.shift_remove(last.as_str()),
        Value::Array(items) => {
            let item = items.get_mut(index_of(last)?)?;
            Some(std::mem::take(item))
        }
        _ => None,
    }
}

/// Get a mutable slot for `segment` inside `node`, reshaping `node` into a
/// container that can hold it.
fn slot<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let len = node.as_array().map_or(0, Vec::len);
    let index = index_of(segment).filter(|&index| within_padding(len, index));
    reshape(node, index.is_some());
    match node {
        Value::Array(items) => {
            let index = index.unwrap_or(items.len());
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
        // reshape() leaves only containers behind
        other => other,
    }
}

fn reshape(node: &mut Value, indexed: bool) {
    match node {
        Value::Object(_) => {}
        Value::Array(_) if indexed => {}
        Value::Array(items) => {
            let map: Map<String, Value> = std::mem::take(items)
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect();
            *node = Value::Object(map);
        }
        _ if indexed => *node = Value::Array(Vec::new()),
        _ => *node = Value::Object(Map::new()),
    }
}
