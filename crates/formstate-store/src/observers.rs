//! Observer registry shared by a [`Store`](crate::Store) and its handles.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use formstate_path::Path;
use indexmap::IndexMap;
use serde_json::Value;

use crate::diff::DifferenceMap;

/// Callback invoked with the value at its registered path.
pub type Observer = Rc<dyn Fn(Option<&Value>)>;

/// Callback invoked once per mutation with the whole batch.
pub type BatchObserver = Rc<dyn Fn(&BatchUpdate)>;

/// Keys are unique across every store in the process, so a handle
/// returned by one store can never unregister an observer of another.
static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObserverKey(u64);

impl ObserverKey {
    fn next() -> Self {
        ObserverKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// Registration token returned by `watch`, `watch_effect` and
/// `watch_batch_updates`. Pass it back to `unwatch` to release the
/// observer; dropping it leaves the observer registered.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle {
    key: ObserverKey,
    path: Option<Path>,
}

impl WatchHandle {
    /// Registered path, or `None` for a batch observer.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }
}

/// One settled mutation, as seen by batch observers.
#[derive(Debug, Clone)]
pub struct BatchUpdate {
    /// Path the mutation was issued at (root for `set_values`).
    pub origin: Path,
    pub diff: DifferenceMap,
    /// The whole tree after the mutation.
    pub values: Value,
}

impl BatchUpdate {
    /// Changed regions of this batch.
    pub fn changed_paths(&self) -> impl Iterator<Item = &Path> {
        self.diff.changed_paths()
    }
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    by_path: IndexMap<Path, Vec<(ObserverKey, Observer)>>,
    batch: Vec<(ObserverKey, BatchObserver)>,
}

impl ObserverRegistry {
    pub fn add(&mut self, path: &Path, observer: Observer) -> WatchHandle {
        let key = ObserverKey::next();
        self.by_path
            .entry(path.clone())
            .or_default()
            .push((key, observer));
        WatchHandle {
            key,
            path: Some(path.clone()),
        }
    }

    pub fn add_batch(&mut self, observer: BatchObserver) -> WatchHandle {
        let key = ObserverKey::next();
        self.batch.push((key, observer));
        WatchHandle { key, path: None }
    }

    /// Remove the observer behind `handle`; `false` if it was not registered.
    pub fn remove(&mut self, handle: &WatchHandle) -> bool {
        match &handle.path {
            Some(path) => {
                let Some(observers) = self.by_path.get_mut(path) else {
                    return false;
                };
                let before = observers.len();
                observers.retain(|(key, _)| *key != handle.key);
                let removed = observers.len() != before;
                if observers.is_empty() {
                    self.by_path.shift_remove(path);
                }
                removed
            }
            None => {
                let before = self.batch.len();
                self.batch.retain(|(key, _)| *key != handle.key);
                self.batch.len() != before
            }
        }
    }

    pub fn contains(&self, key: ObserverKey, path: &Path) -> bool {
        self.by_path
            .get(path)
            .is_some_and(|observers| observers.iter().any(|(k, _)| *k == key))
    }

    pub fn contains_batch(&self, key: ObserverKey) -> bool {
        self.batch.iter().any(|(k, _)| *k == key)
    }

    /// Snapshot of every path observer whose path satisfies `select`, in
    /// registration order within each path.
    pub fn select(&self, select: impl Fn(&Path) -> bool) -> Vec<(ObserverKey, Path, Observer)> {
        self.by_path
            .iter()
            .filter(|(path, _)| select(path))
            .flat_map(|(path, observers)| {
                observers
                    .iter()
                    .map(move |(key, observer)| (*key, path.clone(), observer.clone()))
            })
            .collect()
    }

    pub fn batch_observers(&self) -> Vec<(ObserverKey, BatchObserver)> {
        self.batch.clone()
    }

    pub fn len(&self) -> usize {
        self.by_path.values().map(Vec::len).sum::<usize>() + self.batch.len()
    }
}
