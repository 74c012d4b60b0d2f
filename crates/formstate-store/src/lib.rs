//! Path-addressed reactive store with proxy translation.
//!
//! - [`Store`]: one observable value tree. Writes are batches; observers
//!   fire when their path is related to a changed region.
//! - [`difference_map`]: the minimal set of changed regions between two
//!   trees.
//! - [`MappingProxy`]: a virtual shape over real paths, mounted at a path.
//! - [`StoreView`]: routes store calls through an optional proxy.
//! - [`attach_devtools`]: forwards batch updates to an inspector.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//!
//! use formstate_path::path;
//! use formstate_store::{MappingProxy, ProxyMapSource, Store, StoreView};
//! use serde_json::json;
//!
//! let store = Store::new(json!({"u": {"f": "A", "l": "B"}}));
//! let proxy = MappingProxy::new(
//!     ProxyMapSource::object([(
//!         "full",
//!         ProxyMapSource::object([
//!             ("first", ProxyMapSource::leaf(path!["u", "f"])),
//!             ("last", ProxyMapSource::leaf(path!["u", "l"])),
//!         ]),
//!     )]),
//!     path!["p"],
//! );
//! proxy.activate().unwrap();
//!
//! let view = StoreView::new(store.clone(), Some(Rc::new(proxy))).unwrap();
//! assert_eq!(
//!     view.get_value(&path!["p", "full"]).unwrap(),
//!     Some(json!({"first": "A", "last": "B"}))
//! );
//! ```

pub mod devtools;
pub mod diff;
pub mod error;
pub mod intercept;
pub mod observers;
pub mod proxy;
pub mod store;

pub use devtools::{
    attach_devtools, DevtoolsBridge, DevtoolsMessage, DevtoolsPayload, QueuedBridge, WirePath,
    ROOT_PATH_TOKEN,
};
pub use diff::{difference_map, flatten, DifferenceMap};
pub use error::{ProxyError, StoreError};
pub use intercept::{should_intercept, StoreView};
pub use observers::{BatchObserver, BatchUpdate, Observer, WatchHandle};
pub use proxy::{MappingProxy, ProxyMapSource};
pub use store::Store;
