use std::collections::{BTreeMap, BTreeSet};

use formstate_path::Path;
use formstate_store::{difference_map, flatten};
use proptest::prelude::*;
use serde_json::Value;

/// Small key and scalar alphabets so that generated trees overlap often.
fn arb_tree() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (0i64..3).prop_map(Value::from),
        "[xy]".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn leaf_map(tree: &Value) -> BTreeMap<Path, Value> {
    flatten(tree)
        .into_iter()
        .map(|(path, value)| (path, value.clone()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn keys_form_an_antichain(old in arb_tree(), new in arb_tree()) {
        let diff = difference_map(&old, &new);
        let keys: Vec<&Path> = diff.paths().collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                prop_assert!(!a.is_related(b), "{a} and {b} are related");
            }
        }
    }

    #[test]
    fn every_leaf_has_one_authoritative_key(old in arb_tree(), new in arb_tree()) {
        let diff = difference_map(&old, &new);
        let old_leaves = leaf_map(&old);
        let new_leaves = leaf_map(&new);
        let all: BTreeSet<&Path> = old_leaves.keys().chain(new_leaves.keys()).collect();

        for leaf in all {
            let covering: Vec<(&Path, bool)> = diff
                .iter()
                .filter(|(key, _)| leaf.starts_with(key))
                .collect();
            prop_assert_eq!(covering.len(), 1, "leaf {} covered by {:?}", leaf, covering);

            let equal = match (old_leaves.get(leaf), new_leaves.get(leaf)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            prop_assert_eq!(covering[0].1, equal, "leaf {}", leaf);
        }
    }

    #[test]
    fn identical_trees_collapse_to_root(tree in arb_tree()) {
        let diff = difference_map(&tree, &tree.clone());
        prop_assert_eq!(diff.len(), 1);
        prop_assert_eq!(diff.get(&Path::root()), Some(true));
    }
}
