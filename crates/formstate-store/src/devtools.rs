//! Devtools bridge: batch updates serialized for an external inspector.
//!
//! Paths cross the wire as segment arrays. The root path has no segments to
//! send, so it travels as the fixed [`ROOT_PATH_TOKEN`] string instead.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use formstate_path::Path;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::observers::{BatchUpdate, WatchHandle};
use crate::store::Store;

/// Wire token standing in for the root path.
pub const ROOT_PATH_TOKEN: &str = "__ROOT_PATH";

/// A path in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePath {
    Root,
    Segments(Vec<String>),
}

impl From<&Path> for WirePath {
    fn from(path: &Path) -> Self {
        if path.is_root() {
            WirePath::Root
        } else {
            WirePath::Segments(path.segments().to_vec())
        }
    }
}

impl From<WirePath> for Path {
    fn from(path: WirePath) -> Self {
        match path {
            WirePath::Root => Path::root(),
            WirePath::Segments(segments) => Path::from(segments),
        }
    }
}

impl Serialize for WirePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WirePath::Root => serializer.serialize_str(ROOT_PATH_TOKEN),
            WirePath::Segments(segments) => segments.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WirePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Token(String),
            Segments(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Token(token) if token == ROOT_PATH_TOKEN => Ok(WirePath::Root),
            Raw::Token(token) => Err(de::Error::custom(format!(
                "expected {ROOT_PATH_TOKEN:?} or a segment array, got {token:?}"
            ))),
            // An empty array is the root as well.
            Raw::Segments(segments) if segments.is_empty() => Ok(WirePath::Root),
            Raw::Segments(segments) => Ok(WirePath::Segments(segments)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevtoolsPayload {
    /// Name the store was attached under.
    pub store: String,
    pub paths: Vec<WirePath>,
    pub values: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevtoolsMessage {
    pub event: String,
    pub data: DevtoolsPayload,
}

impl DevtoolsMessage {
    pub fn new(event: impl Into<String>, store: impl Into<String>, paths: Vec<WirePath>, values: Value) -> Self {
        DevtoolsMessage {
            event: event.into(),
            data: DevtoolsPayload {
                store: store.into(),
                paths,
                values,
            },
        }
    }
}

/// Receiver of devtools events.
pub trait DevtoolsBridge {
    fn raise_event(&self, message: DevtoolsMessage);
}

/// Bridge that serializes messages to JSON and posts them through a
/// callback, holding them in a queue until the inspector reports it has
/// loaded.
pub struct QueuedBridge<F: Fn(String)> {
    post: F,
    loaded: Cell<bool>,
    queue: RefCell<Vec<String>>,
}

impl<F: Fn(String)> QueuedBridge<F> {
    pub fn new(post: F) -> Self {
        QueuedBridge {
            post,
            loaded: Cell::new(false),
            queue: RefCell::new(Vec::new()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get()
    }

    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Mark the inspector loaded and flush queued messages in order.
    pub fn on_load(&self) {
        self.loaded.set(true);
        let queued = std::mem::take(&mut *self.queue.borrow_mut());
        debug!(flushed = queued.len(), "devtools loaded");
        for message in queued {
            (self.post)(message);
        }
    }
}

impl<F: Fn(String)> DevtoolsBridge for QueuedBridge<F> {
    fn raise_event(&self, message: DevtoolsMessage) {
        let encoded = match serde_json::to_string(&message) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(event = %message.event, error = %e, "devtools message not serializable");
                return;
            }
        };
        if self.loaded.get() {
            (self.post)(encoded);
        } else {
            self.queue.borrow_mut().push(encoded);
        }
    }
}

/// Forward every batch update of `store` to `bridge` as a `"batch"` event,
/// after an `"init"` event carrying the current tree.
pub fn attach_devtools(store: &Store, name: impl Into<String>, bridge: Rc<dyn DevtoolsBridge>) -> WatchHandle {
    let name = name.into();
    bridge.raise_event(DevtoolsMessage::new(
        "init",
        name.clone(),
        vec![WirePath::Root],
        store.get_values(),
    ));
    store.watch_batch_updates(move |update: &BatchUpdate| {
        let paths = update.changed_paths().map(WirePath::from).collect();
        bridge.raise_event(DevtoolsMessage::new("batch", name.clone(), paths, update.values.clone()));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_path::path;
    use serde_json::json;

    #[test]
    fn test_wire_path_serialization() {
        let root = serde_json::to_value(WirePath::from(&Path::root())).unwrap();
        assert_eq!(root, json!("__ROOT_PATH"));
        let nested = serde_json::to_value(WirePath::from(&path!["a", 0])).unwrap();
        assert_eq!(nested, json!(["a", "0"]));

        let back: WirePath = serde_json::from_value(json!("__ROOT_PATH")).unwrap();
        assert_eq!(Path::from(back), Path::root());
        let back: WirePath = serde_json::from_value(json!(["x"])).unwrap();
        assert_eq!(Path::from(back), path!["x"]);
        assert!(serde_json::from_value::<WirePath>(json!("other")).is_err());
    }

    #[test]
    fn test_queue_until_loaded() {
        let posted = Rc::new(RefCell::new(Vec::new()));
        let sink = posted.clone();
        let bridge = QueuedBridge::new(move |message| sink.borrow_mut().push(message));

        bridge.raise_event(DevtoolsMessage::new("one", "s", vec![], json!(null)));
        bridge.raise_event(DevtoolsMessage::new("two", "s", vec![], json!(null)));
        assert!(posted.borrow().is_empty());
        assert_eq!(bridge.queued(), 2);
        assert!(!bridge.is_loaded());

        bridge.on_load();
        assert!(bridge.is_loaded());
        bridge.raise_event(DevtoolsMessage::new("three", "s", vec![], json!(null)));
        let events: Vec<String> = posted
            .borrow()
            .iter()
            .map(|m| serde_json::from_str::<DevtoolsMessage>(m).unwrap().event)
            .collect();
        assert_eq!(events, vec!["one", "two", "three"]);
        assert_eq!(bridge.queued(), 0);
    }

    #[test]
    fn test_attach_forwards_batches() {
        let posted = Rc::new(RefCell::new(Vec::new()));
        let sink = posted.clone();
        let bridge = Rc::new(QueuedBridge::new(move |message| sink.borrow_mut().push(message)));
        bridge.on_load();

        let store = Store::new(json!({"a": 1}));
        attach_devtools(&store, "values", bridge.clone());
        store.set_value(&path!["a"], json!(2));
        store.set_values(json!({}));

        let messages: Vec<DevtoolsMessage> = posted
            .borrow()
            .iter()
            .map(|m| serde_json::from_str(m).unwrap())
            .collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].event, "init");
        assert_eq!(messages[0].data.paths, vec![WirePath::Root]);
        assert_eq!(messages[1].event, "batch");
        assert_eq!(messages[1].data.store, "values");
        assert_eq!(messages[1].data.paths, vec![WirePath::Segments(vec!["a".into()])]);
        assert_eq!(messages[1].data.values, json!({"a": 2}));
        assert_eq!(messages[2].data.paths, vec![WirePath::Root]);
    }
}
