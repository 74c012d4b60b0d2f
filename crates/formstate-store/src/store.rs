//! Path-addressed reactive store.
//!
//! A [`Store`] owns one value tree and the observers registered against
//! paths inside it. Every mutation is one batch: the tree is updated, the
//! changed regions are computed, and each observer whose path is related to
//! a changed region fires exactly once with the value at its own path.
//! Batch observers then fire with the whole [`BatchUpdate`].
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use formstate_path::path;
//! use formstate_store::Store;
//! use serde_json::json;
//!
//! let store = Store::new(json!({"a": {"b": 1, "c": 2}}));
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! store.watch(&path!["a", "b"], move |value| sink.borrow_mut().push(value.cloned()));
//!
//! store.set_value(&path!["a", "b"], json!(2));
//! store.set_value(&path!["a", "c"], json!(5));
//! assert_eq!(*seen.borrow(), vec![Some(json!(2))]);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use formstate_path::{deep_get, deep_set, Path, SetAction};
use serde_json::Value;
use tracing::{debug, trace};

use crate::diff::{difference_map, DifferenceMap};
use crate::error::StoreError;
use crate::observers::{BatchObserver, BatchUpdate, Observer, ObserverRegistry, WatchHandle};

struct StoreInner {
    values: RefCell<Value>,
    registry: RefCell<ObserverRegistry>,
}

/// Handle to one observable value tree. Cloning shares the tree.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub fn new(initial: Value) -> Self {
        Store {
            inner: Rc::new(StoreInner {
                values: RefCell::new(initial),
                registry: RefCell::new(ObserverRegistry::default()),
            }),
        }
    }

    /// `true` if both handles point at the same tree.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Clone of the value at `path`; `None` when absent.
    pub fn get_value(&self, path: &Path) -> Option<Value> {
        deep_get(&self.inner.values.borrow(), path).cloned()
    }

    /// Borrow the value at `path` without cloning.
    ///
    /// `f` must not write to this store.
    pub fn with_value<R>(&self, path: &Path, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(deep_get(&self.inner.values.borrow(), path))
    }

    pub fn get_values(&self) -> Value {
        self.inner.values.borrow().clone()
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Write at `path` and notify every observer related to it.
    ///
    /// Observers fire even when the written value equals the old one.
    pub fn set_value(&self, path: &Path, action: impl Into<SetAction>) {
        let value = match action.into() {
            SetAction::Value(value) => value,
            update => {
                let current = self.get_value(path);
                update.resolve(current.as_ref())
            }
        };
        deep_set(&mut self.inner.values.borrow_mut(), path, value);
        self.notify(path.clone(), DifferenceMap::changed_at(path.clone()));
    }

    /// Replace the whole tree and notify observers related to any changed
    /// region of the difference between the old and new trees.
    pub fn set_values(&self, values: Value) {
        let old = std::mem::replace(&mut *self.inner.values.borrow_mut(), values);
        let diff = difference_map(&old, &self.inner.values.borrow());
        self.notify(Path::root(), diff);
    }

    /// Fire every observer as if the whole tree had changed.
    pub fn notify_all(&self) {
        self.notify(Path::root(), DifferenceMap::changed_at(Path::root()));
    }

    // ── Observers ───────────────────────────────────────────────────────

    pub fn watch(&self, path: &Path, observer: impl Fn(Option<&Value>) + 'static) -> WatchHandle {
        self.watch_observer(path, Rc::new(observer))
    }

    /// [`watch`](Self::watch) with an already shared observer.
    pub fn watch_observer(&self, path: &Path, observer: Observer) -> WatchHandle {
        self.inner.registry.borrow_mut().add(path, observer)
    }

    /// Like [`watch`](Self::watch), but also calls `observer` right away
    /// with the current value.
    pub fn watch_effect(&self, path: &Path, observer: impl Fn(Option<&Value>) + 'static) -> WatchHandle {
        self.watch_effect_observer(path, Rc::new(observer))
    }

    pub fn watch_effect_observer(&self, path: &Path, observer: Observer) -> WatchHandle {
        let handle = self.watch_observer(path, observer.clone());
        let current = self.get_value(path);
        observer(current.as_ref());
        handle
    }

    /// Register a callback fired once per mutation, after path observers.
    pub fn watch_batch_updates(&self, callback: impl Fn(&BatchUpdate) + 'static) -> WatchHandle {
        let callback: BatchObserver = Rc::new(callback);
        self.inner.registry.borrow_mut().add_batch(callback)
    }

    /// Release a registration. An unknown handle is a usage error.
    pub fn unwatch(&self, handle: WatchHandle) -> Result<(), StoreError> {
        if self.inner.registry.borrow_mut().remove(&handle) {
            Ok(())
        } else {
            Err(StoreError::UnknownObserver)
        }
    }

    /// Number of live registrations, batch observers included.
    pub fn observer_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    fn notify(&self, origin: Path, diff: DifferenceMap) {
        let targets = self.inner.registry.borrow().select(|path| diff.affects(path));
        debug!(
            origin = %origin,
            regions = diff.len(),
            observers = targets.len(),
            "store batch"
        );

        for (key, path, observer) in targets {
            // An earlier observer of this batch may have unwatched it.
            if !self.inner.registry.borrow().contains(key, &path) {
                continue;
            }
            trace!(path = %path, "dispatch observer");
            let value = self.get_value(&path);
            observer(value.as_ref());
        }

        let batch = self.inner.registry.borrow().batch_observers();
        if batch.is_empty() {
            return;
        }
        let update = BatchUpdate {
            origin,
            diff,
            values: self.get_values(),
        };
        for (key, callback) in batch {
            if self.inner.registry.borrow().contains_batch(key) {
                callback(&update);
            }
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new(Value::Object(Default::default()))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("values", &self.inner.values.borrow())
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_path::path;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn recorder() -> (Rc<RefCell<Vec<Option<Value>>>>, impl Fn(Option<&Value>) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value: Option<&Value>| sink.borrow_mut().push(value.cloned()))
    }

    #[test]
    fn test_get_and_set() {
        let store = Store::new(json!({}));
        assert_eq!(store.get_value(&path!["a"]), None);
        store.set_value(&path!["a", "b"], json!(1));
        assert_eq!(store.get_value(&path!["a"]), Some(json!({"b": 1})));
        assert_eq!(store.get_values(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_set_value_updater_sees_old_value() {
        let store = Store::new(json!({"n": 41}));
        store.set_value(
            &path!["n"],
            SetAction::update(|old| json!(old.and_then(Value::as_i64).unwrap_or(0) + 1)),
        );
        assert_eq!(store.get_value(&path!["n"]), Some(json!(42)));
    }

    #[test]
    fn test_watch_fires_for_self_only() {
        let store = Store::new(json!({"a": {"b": 1, "c": 2}}));
        let (seen, observer) = recorder();
        store.watch(&path!["a", "b"], observer);

        store.set_value(&path!["a", "b"], json!(2));
        assert_eq!(*seen.borrow(), vec![Some(json!(2))]);

        store.set_value(&path!["a", "c"], json!(5));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_watch_fires_for_ancestor_and_descendant_writes() {
        let store = Store::new(json!({"a": {"b": {"c": 1}}}));
        let (seen, observer) = recorder();
        store.watch(&path!["a", "b"], observer);

        store.set_value(&path!["a"], json!({"b": {"c": 2}}));
        store.set_value(&path!["a", "b", "c"], json!(3));
        assert_eq!(
            *seen.borrow(),
            vec![Some(json!({"c": 2})), Some(json!({"c": 3}))]
        );
    }

    #[test]
    fn test_noop_write_still_notifies() {
        let store = Store::new(json!({"x": 1}));
        let (seen, observer) = recorder();
        store.watch(&path!["x"], observer);
        store.set_value(&path!["x"], json!(1));
        assert_eq!(*seen.borrow(), vec![Some(json!(1))]);
    }

    #[test]
    fn test_watch_effect_calls_immediately() {
        let store = Store::new(json!({"x": "now"}));
        let (seen, observer) = recorder();
        store.watch_effect(&path!["x"], observer);
        assert_eq!(*seen.borrow(), vec![Some(json!("now"))]);
    }

    #[test]
    fn test_observers_fire_once_per_batch() {
        let store = Store::new(json!({"a": {"b": 1, "c": 1}, "d": {"e": 1, "f": 1}}));
        let (seen, observer) = recorder();
        store.watch(&path!["a"], observer);

        // Two changed regions under "a" still fire the "a" observer once.
        store.set_values(json!({"a": {"b": 2, "c": 1, "z": 0}, "d": {"e": 1, "f": 1}}));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_set_values_skips_unrelated() {
        let store = Store::new(json!({"a": 1, "b": 1}));
        let (seen_a, observer_a) = recorder();
        let (seen_b, observer_b) = recorder();
        store.watch(&path!["a"], observer_a);
        store.watch(&path!["b"], observer_b);

        store.set_values(json!({"a": 2, "b": 1}));
        assert_eq!(*seen_a.borrow(), vec![Some(json!(2))]);
        assert!(seen_b.borrow().is_empty());
    }

    #[test]
    fn test_same_path_order() {
        let store = Store::new(json!({}));
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            store.watch(&path!["k"], move |_| order.borrow_mut().push(tag));
        }
        store.set_value(&path!["k"], json!(true));
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_batch_observers_fire_after_path_observers() {
        let store = Store::new(json!({}));
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let order = order.clone();
            store.watch_batch_updates(move |update| {
                order.borrow_mut().push(format!("batch {}", update.origin));
            });
        }
        {
            let order = order.clone();
            store.watch(&path!["a"], move |_| order.borrow_mut().push("path".to_string()));
        }
        store.set_value(&path!["a"], json!(1));
        assert_eq!(*order.borrow(), vec!["path".to_string(), "batch /a".to_string()]);
    }

    #[test]
    fn test_batch_update_carries_diff_and_values() {
        let store = Store::new(json!({"a": 1, "b": 1}));
        let last = Rc::new(RefCell::new(None));
        let sink = last.clone();
        store.watch_batch_updates(move |update| *sink.borrow_mut() = Some(update.clone()));

        store.set_values(json!({"a": 1, "b": 2}));
        let update = last.borrow().clone().unwrap();
        assert_eq!(update.origin, Path::root());
        assert_eq!(update.values, json!({"a": 1, "b": 2}));
        let changed: Vec<&Path> = update.changed_paths().collect();
        assert_eq!(changed, vec![&path!["b"]]);
    }

    #[test]
    fn test_unwatch() {
        let store = Store::new(json!({}));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let handle = store.watch(&path!["a"], move |_| counter.set(counter.get() + 1));
        assert_eq!(store.observer_count(), 1);

        store.unwatch(handle).unwrap();
        store.set_value(&path!["a"], json!(1));
        assert_eq!(calls.get(), 0);
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn test_unwatch_foreign_handle_is_error() {
        let left = Store::default();
        let right = Store::default();
        let handle = left.watch(&path!["a"], |_| {});
        assert_eq!(right.unwatch(handle), Err(StoreError::UnknownObserver));
        assert_eq!(left.observer_count(), 1);
    }

    #[test]
    fn test_reentrant_observer_can_write() {
        let store = Store::new(json!({"src": 0, "mirror": 0}));
        let writer = store.clone();
        store.watch(&path!["src"], move |value| {
            writer.set_value(&path!["mirror"], value.cloned().unwrap_or(Value::Null));
        });
        store.set_value(&path!["src"], json!(7));
        assert_eq!(store.get_value(&path!["mirror"]), Some(json!(7)));
    }

    #[test]
    fn test_observer_unwatched_mid_batch_is_skipped() {
        let store = Store::new(json!({}));
        let second_calls = Rc::new(Cell::new(0));
        let pending: Rc<RefCell<Option<WatchHandle>>> = Rc::new(RefCell::new(None));

        {
            let store2 = store.clone();
            let pending = pending.clone();
            store.watch(&path!["a"], move |_| {
                if let Some(handle) = pending.borrow_mut().take() {
                    store2.unwatch(handle).unwrap();
                }
            });
        }
        let counter = second_calls.clone();
        let handle = store.watch(&path!["a"], move |_| counter.set(counter.get() + 1));
        *pending.borrow_mut() = Some(handle);

        store.set_value(&path!["a"], json!(1));
        assert_eq!(second_calls.get(), 0);
    }

    #[test]
    fn test_notify_all() {
        let store = Store::new(json!({"a": 1, "b": {"c": 2}}));
        let (seen_a, observer_a) = recorder();
        let (seen_c, observer_c) = recorder();
        store.watch(&path!["a"], observer_a);
        store.watch(&path!["b", "c"], observer_c);
        store.notify_all();
        assert_eq!(*seen_a.borrow(), vec![Some(json!(1))]);
        assert_eq!(*seen_c.borrow(), vec![Some(json!(2))]);
    }
}
