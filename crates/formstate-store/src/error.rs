//! Usage errors raised by the store, the proxy and the router.
//!
//! Every variant is a programmer mistake: the call site is wrong and
//! retrying will not help.

use formstate_path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("NOT_ACTIVATED: proxy must be activated before use")]
    NotActivated,
    #[error("ALREADY_ACTIVATED")]
    AlreadyActivated,
    #[error("NOT_INTERCEPTED: {path} is outside the proxy mount {mount}")]
    NotIntercepted { path: Path, mount: Path },
    #[error("UNMAPPED_PATH: {0} does not resolve through the mapping")]
    UnmappedPath(Path),
    #[error("NO_MAPPING: no virtual path exposes {0}")]
    NoMapping(Path),
    #[error("AMBIGUOUS_MAPPING: {0} spans several virtual nodes")]
    AmbiguousMapping(Path),
    #[error("INVALID_MAP_SOURCE: {0}")]
    InvalidMapSource(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("UNKNOWN_OBSERVER: watch handle is not registered")]
    UnknownObserver,
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}
