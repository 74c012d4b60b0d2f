//! Mapping proxy: a virtual shape over paths stored elsewhere.
//!
//! A [`ProxyMapSource`] is a tree whose internal nodes describe the virtual
//! shape and whose leaves name real paths. A [`MappingProxy`] exposes that
//! shape under a mount path. Virtual reads, writes and subscriptions are
//! rewritten to the real paths and handed to caller-supplied store
//! primitives, so the proxy itself owns no data.
//!
//! ```
//! use formstate_path::{path, deep_get};
//! use formstate_store::{MappingProxy, ProxyMapSource};
//! use serde_json::json;
//!
//! let proxy = MappingProxy::new(
//!     ProxyMapSource::object([("name", ProxyMapSource::leaf(path!["user", "first"]))]),
//!     path!["form"],
//! );
//! proxy.activate().unwrap();
//!
//! let real = json!({"user": {"first": "Ann"}});
//! let get = |p: &formstate_path::Path| deep_get(&real, p).cloned();
//! assert_eq!(proxy.get_value(&path!["form", "name"], &get).unwrap(), Some(json!("Ann")));
//! assert_eq!(proxy.get_normal_path(&path!["form", "name"]).unwrap(), path!["user", "first"]);
//! assert_eq!(proxy.get_proxied_path(&path!["user", "first"]).unwrap(), path!["form", "name"]);
//! ```

use std::cell::Cell;
use std::rc::Rc;

use formstate_path::{child, deep_get, index_of, Path, SetAction};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ProxyError;
use crate::observers::{Observer, WatchHandle};

// ── Mapping source ─────────────────────────────────────────────────────

/// Declarative virtual shape. Leaves hold real paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyMapSource {
    Leaf(Path),
    Object(IndexMap<String, ProxyMapSource>),
    Array(Vec<ProxyMapSource>),
}

impl ProxyMapSource {
    pub fn leaf(path: Path) -> Self {
        ProxyMapSource::Leaf(path)
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ProxyMapSource)>,
    {
        ProxyMapSource::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(items: impl IntoIterator<Item = ProxyMapSource>) -> Self {
        ProxyMapSource::Array(items.into_iter().collect())
    }

    /// Build a mapping from JSON: strings are pointer leaves, objects and
    /// arrays are virtual nodes.
    ///
    /// ```
    /// use formstate_path::path;
    /// use formstate_store::ProxyMapSource;
    /// use serde_json::json;
    ///
    /// let map = ProxyMapSource::from_json(&json!({"rows": ["/a/0", "/b"]})).unwrap();
    /// assert_eq!(
    ///     map,
    ///     ProxyMapSource::object([(
    ///         "rows",
    ///         ProxyMapSource::array([
    ///             ProxyMapSource::leaf(path!["a", 0]),
    ///             ProxyMapSource::leaf(path!["b"]),
    ///         ]),
    ///     )])
    /// );
    /// ```
    pub fn from_json(value: &Value) -> Result<Self, ProxyError> {
        match value {
            Value::String(pointer) => Path::parse_pointer(pointer)
                .map(ProxyMapSource::Leaf)
                .map_err(|e| ProxyError::InvalidMapSource(format!("{pointer:?}: {e}"))),
            Value::Object(map) => map
                .iter()
                .map(|(key, child)| Ok((key.clone(), ProxyMapSource::from_json(child)?)))
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(ProxyMapSource::Object),
            Value::Array(items) => items
                .iter()
                .map(ProxyMapSource::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(ProxyMapSource::Array),
            other => Err(ProxyError::InvalidMapSource(format!(
                "expected pointer, object or array, got {other}"
            ))),
        }
    }

    /// Every leaf as `(virtual path relative to this node, real path)`.
    pub fn leaves(&self) -> Vec<(Path, &Path)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &mut Vec<String>, out: &mut Vec<(Path, &'a Path)>) {
        match self {
            ProxyMapSource::Leaf(real) => out.push((Path::from(prefix.as_slice()), real)),
            ProxyMapSource::Object(map) => {
                for (key, child) in map {
                    prefix.push(key.clone());
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
            ProxyMapSource::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    prefix.push(i.to_string());
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
        }
    }

    fn child(&self, segment: &str) -> Option<&ProxyMapSource> {
        match self {
            ProxyMapSource::Leaf(_) => None,
            ProxyMapSource::Object(map) => map.get(segment),
            ProxyMapSource::Array(items) => items.get(index_of(segment)?),
        }
    }

    fn at(&self, relative: &Path) -> Option<&ProxyMapSource> {
        relative
            .segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Longest real path shared by every leaf under this node.
    fn anchor(&self) -> Path {
        let leaves = self.leaves();
        Path::common_prefix(leaves.iter().map(|(_, real)| *real))
    }

    /// Rebuild the virtual value of this node from real reads.
    fn assemble(&self, get: &dyn Fn(&Path) -> Option<Value>) -> Option<Value> {
        match self {
            ProxyMapSource::Leaf(real) => get(real),
            ProxyMapSource::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    if let Some(value) = child.assemble(get) {
                        out.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(out))
            }
            ProxyMapSource::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|child| child.assemble(get).unwrap_or(Value::Null))
                    .collect(),
            )),
        }
    }

    /// Spread a virtual value over the real leaves of this node.
    fn scatter(&self, value: Option<&Value>, set: &mut dyn FnMut(&Path, Value)) {
        match self {
            ProxyMapSource::Leaf(real) => set(real, value.cloned().unwrap_or(Value::Null)),
            ProxyMapSource::Object(map) => {
                for (key, node) in map {
                    node.scatter(value.and_then(|v| child(v, key)), set);
                }
            }
            ProxyMapSource::Array(items) => {
                for (i, node) in items.iter().enumerate() {
                    node.scatter(value.and_then(|v| child(v, &i.to_string())), set);
                }
            }
        }
    }
}

// ── Proxy ──────────────────────────────────────────────────────────────

enum Resolved<'a> {
    /// The virtual path goes through a single mapping leaf.
    Leaf(Path),
    /// The virtual path names an internal node of the virtual shape.
    Node(&'a ProxyMapSource),
}

/// A [`ProxyMapSource`] exposed under a mount path.
///
/// The mapping is fixed at construction. The proxy must be activated
/// exactly once before any operation.
#[derive(Debug)]
pub struct MappingProxy {
    map: ProxyMapSource,
    mount: Path,
    active: Cell<bool>,
}

impl MappingProxy {
    pub fn new(map: ProxyMapSource, mount: Path) -> Self {
        MappingProxy {
            map,
            mount,
            active: Cell::new(false),
        }
    }

    /// Convenience for sharing the proxy with [`StoreView`](crate::StoreView)s.
    pub fn into_shared(self) -> Rc<MappingProxy> {
        Rc::new(self)
    }

    pub fn activate(&self) -> Result<(), ProxyError> {
        if self.active.replace(true) {
            return Err(ProxyError::AlreadyActivated);
        }
        debug!(mount = %self.mount, leaves = self.map.leaves().len(), "proxy activated");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn mount_path(&self) -> &Path {
        &self.mount
    }

    /// `true` if `path` is the mount path or lies under it.
    pub fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.mount)
    }

    fn ensure_active(&self) -> Result<(), ProxyError> {
        if self.active.get() {
            Ok(())
        } else {
            Err(ProxyError::NotActivated)
        }
    }

    fn resolve(&self, virtual_path: &Path) -> Result<Resolved<'_>, ProxyError> {
        self.ensure_active()?;
        let relative = virtual_path
            .strip_prefix(&self.mount)
            .ok_or_else(|| ProxyError::NotIntercepted {
                path: virtual_path.clone(),
                mount: self.mount.clone(),
            })?;

        let segments = relative.segments();
        let mut node = &self.map;
        for (i, segment) in segments.iter().enumerate() {
            if let ProxyMapSource::Leaf(real) = node {
                return Ok(Resolved::Leaf(real.concat(&Path::from(&segments[i..]))));
            }
            node = node
                .child(segment)
                .ok_or_else(|| ProxyError::UnmappedPath(virtual_path.clone()))?;
        }
        Ok(match node {
            ProxyMapSource::Leaf(real) => Resolved::Leaf(real.clone()),
            other => Resolved::Node(other),
        })
    }

    /// The real path a virtual path maps to. An internal node maps to the
    /// common ancestor of all its leaves.
    pub fn get_normal_path(&self, virtual_path: &Path) -> Result<Path, ProxyError> {
        Ok(match self.resolve(virtual_path)? {
            Resolved::Leaf(real) => real,
            Resolved::Node(node) => node.anchor(),
        })
    }

    /// Read a virtual value through `get`, which reads real paths.
    ///
    /// Internal nodes are rebuilt in virtual shape: absent object entries
    /// are skipped and absent array items become `null`.
    pub fn get_value(
        &self,
        virtual_path: &Path,
        get: &dyn Fn(&Path) -> Option<Value>,
    ) -> Result<Option<Value>, ProxyError> {
        Ok(match self.resolve(virtual_path)? {
            Resolved::Leaf(real) => get(&real),
            Resolved::Node(node) => node.assemble(get),
        })
    }

    /// Write a virtual value through `set`.
    ///
    /// An updater first sees the old virtual value, rebuilt through `get`;
    /// its result is then spread across the real leaves.
    pub fn set_value(
        &self,
        virtual_path: &Path,
        action: SetAction,
        set: &mut dyn FnMut(&Path, Value),
        get: &dyn Fn(&Path) -> Option<Value>,
    ) -> Result<(), ProxyError> {
        match self.resolve(virtual_path)? {
            Resolved::Leaf(real) => {
                let value = match action {
                    SetAction::Value(value) => value,
                    update => update.resolve(get(&real).as_ref()),
                };
                set(&real, value);
            }
            Resolved::Node(node) => {
                let value = match action {
                    SetAction::Value(value) => value,
                    update => update.resolve(node.assemble(get).as_ref()),
                };
                node.scatter(Some(&value), set);
            }
        }
        Ok(())
    }

    /// Subscribe to a virtual path through `watch`, which subscribes to
    /// real paths.
    ///
    /// An internal node is watched at the common real ancestor of its
    /// leaves, and every delivered value is rebuilt in virtual shape before
    /// `observer` sees it.
    pub fn watch(
        &self,
        virtual_path: &Path,
        observer: Observer,
        watch: &dyn Fn(&Path, Observer) -> WatchHandle,
    ) -> Result<WatchHandle, ProxyError> {
        let (real, observer) = self.translate_observer(virtual_path, observer)?;
        Ok(watch(&real, observer))
    }

    /// [`watch`](Self::watch) routed through an effect registration, which
    /// calls the translated observer right away.
    pub fn watch_effect(
        &self,
        virtual_path: &Path,
        observer: Observer,
        watch_effect: &dyn Fn(&Path, Observer) -> WatchHandle,
    ) -> Result<WatchHandle, ProxyError> {
        let (real, observer) = self.translate_observer(virtual_path, observer)?;
        Ok(watch_effect(&real, observer))
    }

    fn translate_observer(
        &self,
        virtual_path: &Path,
        observer: Observer,
    ) -> Result<(Path, Observer), ProxyError> {
        match self.resolve(virtual_path)? {
            Resolved::Leaf(real) => Ok((real, observer)),
            Resolved::Node(node) => {
                let node = node.clone();
                let anchor = node.anchor();
                let real = anchor.clone();
                let wrapped: Observer = Rc::new(move |value: Option<&Value>| {
                    let get = |leaf: &Path| {
                        let rest = leaf.strip_prefix(&anchor)?;
                        deep_get(value?, &rest).cloned()
                    };
                    let rebuilt = node.assemble(&get);
                    observer(rebuilt.as_ref());
                });
                Ok((real, wrapped))
            }
        }
    }

    /// Reverse lookup: the virtual path exposing `real`.
    ///
    /// A real path inside a mapping leaf maps through the most specific
    /// such leaf. A real path above the leaves maps to the deepest internal
    /// virtual node that owns exactly the leaves under it and sits at
    /// `real`: either the leaves' common ancestor is `real`, or climbing
    /// from each leaf as many steps as the node is above it lands on
    /// `real`. The leaf count plays no part, so `{rows: [{name: /a/1/n}]}`
    /// maps `/a/1` to `rows/0` just as a two-field row does. Anything else
    /// is ambiguous.
    pub fn get_proxied_path(&self, real: &Path) -> Result<Path, ProxyError> {
        self.ensure_active()?;
        let leaves = self.map.leaves();

        let covering = leaves
            .iter()
            .filter(|(_, leaf)| real.starts_with(leaf))
            .max_by_key(|(_, leaf)| leaf.len());
        if let Some((virtual_rel, leaf)) = covering {
            let rest = real.strip_prefix(leaf).unwrap_or_default();
            return Ok(self.mount.concat(virtual_rel).concat(&rest));
        }

        let under: Vec<(&Path, &Path)> = leaves
            .iter()
            .filter(|(_, leaf)| leaf.starts_with(real))
            .map(|(virtual_rel, leaf)| (virtual_rel, *leaf))
            .collect();
        if under.is_empty() {
            return Err(ProxyError::NoMapping(real.clone()));
        }

        let mut candidate = Some(Path::common_prefix(under.iter().map(|(v, _)| *v)));
        while let Some(virtual_rel) = candidate {
            let node = self
                .map
                .at(&virtual_rel)
                .ok_or_else(|| ProxyError::AmbiguousMapping(real.clone()))?;
            if node.leaves().len() != under.len() {
                break;
            }
            let sits_at_real = !matches!(node, ProxyMapSource::Leaf(_))
                && (node.anchor() == *real || climb_origin(&virtual_rel, &under) == *real);
            if sits_at_real {
                return Ok(self.mount.concat(&virtual_rel));
            }
            candidate = virtual_rel.parent();
        }
        Err(ProxyError::AmbiguousMapping(real.clone()))
    }
}

/// Where `(virtual, real)` leaves meet when each real path climbs as many
/// steps as its virtual path sits below `node`.
fn climb_origin(node: &Path, leaves: &[(&Path, &Path)]) -> Path {
    let climbed: Vec<Path> = leaves
        .iter()
        .map(|(virtual_rel, real)| {
            let steps = virtual_rel.len().saturating_sub(node.len());
            real.truncate(real.len().saturating_sub(steps))
        })
        .collect();
    Path::common_prefix(&climbed)
}
