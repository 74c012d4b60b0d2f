//! Difference engine: which regions of a tree changed between two snapshots.
//!
//! The result is a minimal antichain of paths. Each leaf of either tree is
//! covered by exactly one key, and a whole subtree collapses into a single
//! key when every leaf under it compares the same way. Notification fan-out
//! therefore scales with the number of distinct changed regions rather than
//! the number of changed leaves.

use std::collections::{BTreeMap, HashMap, VecDeque};

use formstate_path::Path;
use indexmap::IndexMap;
use serde_json::Value;

/// Map from path to "unchanged" flag (`true` means equal in both trees).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DifferenceMap {
    entries: IndexMap<Path, bool>,
}

impl DifferenceMap {
    /// The map of two identical (or two empty) trees.
    pub fn unchanged() -> Self {
        Self::single(Path::root(), true)
    }

    /// The map of a single write at `path`.
    pub fn changed_at(path: Path) -> Self {
        Self::single(path, false)
    }

    fn single(path: Path, unchanged: bool) -> Self {
        let mut entries = IndexMap::with_capacity(1);
        entries.insert(path, unchanged);
        DifferenceMap { entries }
    }

    pub fn get(&self, path: &Path) -> Option<bool> {
        self.entries.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, bool)> {
        self.entries.iter().map(|(path, unchanged)| (path, *unchanged))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys()
    }

    /// Keys whose region changed.
    pub fn changed_paths(&self) -> impl Iterator<Item = &Path> {
        self.iter().filter(|(_, unchanged)| !unchanged).map(|(path, _)| path)
    }

    /// The key covering `path` (itself or its nearest ancestor in the map).
    pub fn covering(&self, path: &Path) -> Option<(&Path, bool)> {
        self.iter().find(|(key, _)| path.starts_with(key))
    }

    /// Whether the leaf or region at `path` changed, resolved through its
    /// covering key. `None` when no key covers it.
    pub fn is_changed(&self, path: &Path) -> Option<bool> {
        self.covering(path).map(|(_, unchanged)| !unchanged)
    }

    /// `true` if a changed region is `path`, one of its ancestors or one of
    /// its descendants.
    pub fn affects(&self, path: &Path) -> bool {
        self.changed_paths().any(|key| key.is_related(path))
    }
}

/// Flatten a tree into its leaves.
///
/// Leaves are scalars and empty containers. A root that is an empty
/// container has no leaves; a scalar root is a single leaf at the root.
pub fn flatten(value: &Value) -> Vec<(Path, &Value)> {
    let mut out = Vec::new();
    let is_empty_container = match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if !is_empty_container {
        flatten_into(value, &mut Vec::new(), &mut out);
    }
    out
}

fn flatten_into<'a>(value: &'a Value, prefix: &mut Vec<String>, out: &mut Vec<(Path, &'a Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                prefix.push(key.clone());
                flatten_into(child, prefix, out);
                prefix.pop();
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                prefix.push(i.to_string());
                flatten_into(child, prefix, out);
                prefix.pop();
            }
        }
        _ => out.push((Path::from(prefix.as_slice()), value)),
    }
}

/// Compute the difference map between `old` and `new`.
///
/// ```
/// use formstate_path::path;
/// use formstate_store::difference_map;
/// use serde_json::json;
///
/// let diff = difference_map(
///     &json!({"a": {"b": 1, "c": 2}, "d": [1, 2]}),
///     &json!({"a": {"b": 1, "c": 3}, "d": [1, 2]}),
/// );
/// assert_eq!(diff.get(&path!["a", "c"]), Some(false));
/// assert_eq!(diff.get(&path!["a", "b"]), Some(true));
/// assert_eq!(diff.get(&path!["d"]), Some(true));
/// ```
pub fn difference_map(old: &Value, new: &Value) -> DifferenceMap {
    let old_leaves = flatten(old);
    let new_leaves = flatten(new);

    match (old_leaves.is_empty(), new_leaves.is_empty()) {
        (true, true) => return DifferenceMap::unchanged(),
        (true, false) | (false, true) => return DifferenceMap::changed_at(Path::root()),
        (false, false) => {}
    }

    let new_index: HashMap<&Path, &Value> = new_leaves.iter().map(|(p, v)| (p, *v)).collect();

    // Sorted so that every subtree is one contiguous range.
    let mut raw: BTreeMap<Path, bool> = BTreeMap::new();
    for (path, value) in &old_leaves {
        let unchanged = new_index.get(path).is_some_and(|other| *other == *value);
        raw.insert(path.clone(), unchanged);
    }
    for (path, _) in &new_leaves {
        raw.entry(path.clone()).or_insert(false);
    }

    let mut entries = IndexMap::new();
    let mut queue = VecDeque::from([Path::root()]);

    while let Some(current) = queue.pop_front() {
        let inner: Vec<(&Path, bool)> = raw
            .range(current.clone()..)
            .take_while(|(path, _)| path.starts_with(&current))
            .map(|(path, unchanged)| (path, *unchanged))
            .collect();

        let first = inner.first().map(|(_, unchanged)| *unchanged);
        if inner.iter().all(|(_, unchanged)| Some(*unchanged) == first) {
            entries.insert(current, first.unwrap_or(true));
            continue;
        }

        // Mixed outcomes imply `current` is a container in both trees, so
        // every collected leaf lies strictly below it.
        let depth = current.len() + 1;
        let mut children: Vec<Path> = Vec::new();
        for (path, _) in &inner {
            let child = path.truncate(depth);
            if children.last() != Some(&child) {
                children.push(child);
            }
        }
        queue.extend(children);
    }

    DifferenceMap { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_path::path;
    use serde_json::json;

    fn entries(diff: &DifferenceMap) -> Vec<(Path, bool)> {
        diff.iter().map(|(p, b)| (p.clone(), b)).collect()
    }

    #[test]
    fn test_flatten() {
        let value = json!({"a": {"b": 1, "c": []}, "d": [true, {}], "e": {}});
        let leaves: Vec<(Path, Value)> = flatten(&value)
            .into_iter()
            .map(|(p, v)| (p, v.clone()))
            .collect();
        assert_eq!(
            leaves,
            vec![
                (path!["a", "b"], json!(1)),
                (path!["a", "c"], json!([])),
                (path!["d", 0], json!(true)),
                (path!["d", 1], json!({})),
                (path!["e"], json!({})),
            ]
        );
    }

    #[test]
    fn test_flatten_roots() {
        assert!(flatten(&json!({})).is_empty());
        assert!(flatten(&json!([])).is_empty());
        assert_eq!(flatten(&json!(5)), vec![(Path::root(), &json!(5))]);
    }

    #[test]
    fn test_both_empty_is_unchanged() {
        let diff = difference_map(&json!({}), &json!({}));
        assert_eq!(entries(&diff), vec![(Path::root(), true)]);
    }

    #[test]
    fn test_one_empty_is_total_change() {
        let diff = difference_map(&json!({}), &json!({"a": 1}));
        assert_eq!(entries(&diff), vec![(Path::root(), false)]);
        let diff = difference_map(&json!({"a": 1}), &json!({}));
        assert_eq!(entries(&diff), vec![(Path::root(), false)]);
    }

    #[test]
    fn test_identical_collapses_to_root() {
        let tree = json!({"a": {"b": [1, 2, 3]}, "c": "x"});
        let diff = difference_map(&tree, &tree.clone());
        assert_eq!(entries(&diff), vec![(Path::root(), true)]);
    }

    #[test]
    fn test_all_changed_collapses_to_root() {
        let diff = difference_map(&json!({"a": 1, "b": 2}), &json!({"a": 3, "b": 4}));
        assert_eq!(entries(&diff), vec![(Path::root(), false)]);
    }

    #[test]
    fn test_mixed_descends_to_distinct_regions() {
        let old = json!({"a": {"b": 1, "c": 2}, "d": {"e": 1, "f": 1}});
        let new = json!({"a": {"b": 1, "c": 5}, "d": {"e": 2, "f": 2}});
        let diff = difference_map(&old, &new);
        assert_eq!(
            entries(&diff),
            vec![
                (path!["d"], false),
                (path!["a", "b"], true),
                (path!["a", "c"], false),
            ]
        );
    }

    #[test]
    fn test_added_key_counts_as_change() {
        let diff = difference_map(&json!({"a": 1}), &json!({"a": 1, "b": 2}));
        assert_eq!(diff.get(&path!["a"]), Some(true));
        assert_eq!(diff.get(&path!["b"]), Some(false));
    }

    #[test]
    fn test_scalar_to_container_switch() {
        let old = json!({"a": 1, "z": 0});
        let new = json!({"a": {"b": 2}, "z": 0});
        let diff = difference_map(&old, &new);
        assert_eq!(diff.get(&path!["a"]), Some(false));
        assert_eq!(diff.get(&path!["z"]), Some(true));
    }

    #[test]
    fn test_array_growth() {
        let diff = difference_map(&json!({"l": [1, 2]}), &json!({"l": [1, 2, 3], "m": 0}));
        assert_eq!(diff.get(&path!["l", 2]), Some(false));
        assert!(diff.affects(&path!["l"]));
        assert!(!diff.affects(&path!["l", 0]));
    }

    #[test]
    fn test_affects_and_covering() {
        let diff = difference_map(
            &json!({"a": {"b": 1, "c": 2}, "x": 1}),
            &json!({"a": {"b": 9, "c": 2}, "x": 1}),
        );
        assert!(diff.affects(&path!["a", "b"]));
        assert!(diff.affects(&path!["a"]));
        assert!(diff.affects(&Path::root()));
        assert!(diff.affects(&path!["a", "b", "deeper"]));
        assert!(!diff.affects(&path!["a", "c"]));
        assert!(!diff.affects(&path!["x"]));
        assert_eq!(diff.covering(&path!["x"]), Some((&path!["x"], true)));
        assert_eq!(diff.is_changed(&path!["a", "b"]), Some(true));
        assert_eq!(diff.is_changed(&path!["x"]), Some(false));
        assert_eq!(diff.is_changed(&path!["a"]), None);
    }
}
