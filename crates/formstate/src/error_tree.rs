//! Error trees.
//!
//! Errors live in their own value tree shaped like the values they
//! describe. A node's own message sits under the [`ERROR_KEY`] key next to
//! the errors of its children. A sequence that carries its own message
//! cannot stay a JSON array, so it is stored as an object keyed by index:
//! both `list.$error` and `list.0` then stay addressable.

use std::mem;

use formstate_path::{deep_get, deep_remove, index_of, within_padding, Path};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Key holding a node's own error message.
pub const ERROR_KEY: &str = "$error";

/// Key holding a node's touched flag in the touched tree.
pub const TOUCHED_KEY: &str = "$touched";

/// Tagged view of an error tree, with explicit merge rules per variant pair.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldErrorTree {
    Leaf(Value),
    Mapping {
        error: Option<Value>,
        fields: IndexMap<String, FieldErrorTree>,
    },
    Sequence {
        error: Option<Value>,
        items: Vec<Option<FieldErrorTree>>,
    },
}

impl FieldErrorTree {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut error = None;
                let mut fields = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    if key == ERROR_KEY {
                        error = Some(child.clone());
                    } else {
                        fields.insert(key.clone(), FieldErrorTree::from_value(child));
                    }
                }
                FieldErrorTree::Mapping { error, fields }
            }
            Value::Array(items) => FieldErrorTree::Sequence {
                error: None,
                items: items
                    .iter()
                    .map(|item| (!item.is_null()).then(|| FieldErrorTree::from_value(item)))
                    .collect(),
            },
            other => FieldErrorTree::Leaf(other.clone()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            FieldErrorTree::Leaf(value) => value,
            FieldErrorTree::Mapping { error, fields } => {
                let mut out = Map::new();
                if let Some(error) = error {
                    out.insert(ERROR_KEY.to_string(), error);
                }
                for (key, child) in fields {
                    out.insert(key, child.into_value());
                }
                Value::Object(out)
            }
            FieldErrorTree::Sequence { error: None, items } => Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(Value::Null, FieldErrorTree::into_value))
                    .collect(),
            ),
            FieldErrorTree::Sequence {
                error: Some(error),
                items,
            } => {
                let mut out = Map::new();
                out.insert(ERROR_KEY.to_string(), error);
                for (i, item) in items.into_iter().enumerate() {
                    if let Some(item) = item {
                        out.insert(i.to_string(), item.into_value());
                    }
                }
                Value::Object(out)
            }
        }
    }

    /// The node's own message, if any.
    pub fn error(&self) -> Option<&Value> {
        match self {
            FieldErrorTree::Leaf(_) => None,
            FieldErrorTree::Mapping { error, .. } | FieldErrorTree::Sequence { error, .. } => {
                error.as_ref()
            }
        }
    }

    /// Merge `source` over `self`.
    ///
    /// - A source leaf replaces the target; a target leaf is replaced by
    ///   any source.
    /// - Two mappings merge key by key, two sequences index by index.
    /// - A mapping meets a sequence: when every mapping key is an index,
    ///   the result is a sequence; otherwise the sequence is re-keyed by
    ///   index and the result is a mapping.
    /// - The source's own message wins when present.
    pub fn merge(self, source: FieldErrorTree) -> FieldErrorTree {
        use FieldErrorTree::{Leaf, Mapping, Sequence};

        match (self, source) {
            (_, Leaf(value)) => Leaf(value),
            (Leaf(_), source) => source,
            (
                Mapping {
                    error: target_error,
                    fields: mut target,
                },
                Mapping { error, fields },
            ) => {
                for (key, source) in fields {
                    match target.get_mut(&key) {
                        Some(slot) => {
                            let current = mem::replace(slot, Leaf(Value::Null));
                            *slot = current.merge(source);
                        }
                        None => {
                            target.insert(key, source);
                        }
                    }
                }
                Mapping {
                    error: error.or(target_error),
                    fields: target,
                }
            }
            (
                Sequence {
                    error: target_error,
                    items: target,
                },
                Sequence { error, items },
            ) => Sequence {
                error: error.or(target_error),
                items: merge_items(target, items),
            },
            (
                Sequence {
                    error: target_error,
                    items,
                },
                Mapping { error, fields },
            ) => match fields_as_items(fields) {
                Ok(source) => Sequence {
                    error: error.or(target_error),
                    items: merge_items(items, source),
                },
                Err(fields) => Mapping {
                    error: target_error,
                    fields: items_as_fields(items),
                }
                .merge(Mapping { error, fields }),
            },
            (
                Mapping {
                    error: target_error,
                    fields,
                },
                Sequence { error, items },
            ) => match fields_as_items(fields) {
                Ok(target) => Sequence {
                    error: error.or(target_error),
                    items: merge_items(target, items),
                },
                Err(fields) => Mapping {
                    error: target_error,
                    fields,
                }
                .merge(Mapping {
                    error,
                    fields: items_as_fields(items),
                }),
            },
        }
    }
}

fn merge_items(
    target: Vec<Option<FieldErrorTree>>,
    source: Vec<Option<FieldErrorTree>>,
) -> Vec<Option<FieldErrorTree>> {
    let len = target.len().max(source.len());
    let mut target = target.into_iter();
    let mut source = source.into_iter();
    (0..len)
        .map(|_| match (target.next().flatten(), source.next().flatten()) {
            (Some(t), Some(s)) => Some(t.merge(s)),
            (t, s) => s.or(t),
        })
        .collect()
}

fn fields_as_items(
    fields: IndexMap<String, FieldErrorTree>,
) -> Result<Vec<Option<FieldErrorTree>>, IndexMap<String, FieldErrorTree>> {
    let Some(indices) = fields
        .keys()
        .map(|key| index_of(key).filter(|&index| within_padding(0, index)))
        .collect::<Option<Vec<usize>>>()
    else {
        return Err(fields);
    };
    let len = indices.iter().max().map_or(0, |max| max + 1);
    let mut items: Vec<Option<FieldErrorTree>> = vec![None; len];
    for (index, (_, child)) in indices.into_iter().zip(fields) {
        items[index] = Some(child);
    }
    Ok(items)
}

fn items_as_fields(items: Vec<Option<FieldErrorTree>>) -> IndexMap<String, FieldErrorTree> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| item.map(|item| (i.to_string(), item)))
        .collect()
}

// ── Tree helpers ───────────────────────────────────────────────────────

/// Merge `source` over `target`.
///
/// ```
/// use formstate::merge_errors;
/// use serde_json::json;
///
/// let merged = merge_errors(
///     &json!({"list": {"$error": "too short"}}),
///     &json!({"list": [null, {"$error": "bad"}]}),
/// );
/// assert_eq!(merged, json!({"list": {"$error": "too short", "1": {"$error": "bad"}}}));
/// ```
pub fn merge_errors(target: &Value, source: &Value) -> Value {
    FieldErrorTree::from_value(target)
        .merge(FieldErrorTree::from_value(source))
        .into_value()
}

/// Drop `null` leaves and containers left empty.
///
/// `None` means the tree holds no error at all. Array items are kept in
/// place with `null` holes as long as one item survives.
pub fn deep_remove_empty(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let out: Map<String, Value> = map
                .iter()
                .filter_map(|(key, child)| deep_remove_empty(child).map(|child| (key.clone(), child)))
                .collect();
            (!out.is_empty()).then_some(Value::Object(out))
        }
        Value::Array(items) => {
            let out: Vec<Option<Value>> = items.iter().map(deep_remove_empty).collect();
            if out.iter().all(Option::is_none) {
                return None;
            }
            Some(Value::Array(
                out.into_iter().map(|item| item.unwrap_or(Value::Null)).collect(),
            ))
        }
        scalar => Some(scalar.clone()),
    }
}

/// Shape a validator's output as an error node.
///
/// Strings and other scalars become the node's own message; objects and
/// arrays are complete error trees already. No output clears the message.
pub fn normalize_validator_output(output: Option<Value>) -> Value {
    let mut node = Map::new();
    match output {
        None | Some(Value::Null) => {
            node.insert(ERROR_KEY.to_string(), Value::Null);
        }
        Some(tree @ (Value::Object(_) | Value::Array(_))) => return tree,
        Some(message) => {
            node.insert(ERROR_KEY.to_string(), message);
        }
    }
    Value::Object(node)
}

/// A copy of `shape` with every leaf replaced by `leaf`.
///
/// ```
/// use formstate::set_nested_values;
/// use serde_json::json;
///
/// let touched = set_nested_values(&json!({"a": 1, "b": [2, 3]}), &json!({"$touched": true}));
/// assert_eq!(
///     touched,
///     json!({"a": {"$touched": true}, "b": [{"$touched": true}, {"$touched": true}]})
/// );
/// ```
pub fn set_nested_values(shape: &Value, leaf: &Value) -> Value {
    match shape {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), set_nested_values(child, leaf)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.iter().map(|child| set_nested_values(child, leaf)).collect(),
        ),
        _ => leaf.clone(),
    }
}

/// Remove errors for every region of `values` still equal to `initial`.
pub fn exclude_overlaps(values: &Value, initial: &Value, errors: &Value) -> Value {
    let mut out = errors.clone();
    exclude_at(values, initial, &mut out, &mut Vec::new());
    out
}

fn exclude_at(value: &Value, initial: &Value, errors: &mut Value, prefix: &mut Vec<String>) {
    let path = Path::from(prefix.as_slice());
    if deep_get(initial, &path) == Some(value) {
        if path.is_root() {
            *errors = Value::Object(Map::new());
        } else {
            deep_remove(errors, &path);
        }
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                prefix.push(key.clone());
                exclude_at(child, initial, errors, prefix);
                prefix.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                prefix.push(i.to_string());
                exclude_at(child, initial, errors, prefix);
                prefix.pop();
            }
        }
        _ => {}
    }
}
