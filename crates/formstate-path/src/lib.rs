//! Structural paths and tree accessors for nested form state.
//!
//! A [`Path`] is an immutable list of segments addressing a node inside a
//! `serde_json::Value` tree. The empty path is the root. Array elements are
//! addressed by segments holding a canonical decimal index (`"0"`, `"12"`);
//! whether a segment indexes a sequence is decided by the container it is
//! applied to.
//!
//! # Example
//!
//! ```
//! use formstate_path::{deep_get, deep_set, path, Path};
//! use serde_json::json;
//!
//! let mut tree = json!({});
//! deep_set(&mut tree, &path!["user", "tags", 1], json!("admin"));
//! assert_eq!(tree, json!({"user": {"tags": [null, "admin"]}}));
//!
//! let p = Path::parse_pointer("/user/tags/1").unwrap();
//! assert_eq!(deep_get(&tree, &p), Some(&json!("admin")));
//! ```

use thiserror::Error;

pub mod access;
pub mod path;

pub use access::{child, deep_get, deep_get_mut, deep_remove, deep_set, deep_update, SetAction};
pub use path::{IntoSegment, Path, MAX_PATH_DEPTH, MAX_POINTER_LENGTH};

/// How far past the end of an array a write may reach.
///
/// Writing an index further out than this stores it as an object key
/// instead of padding the array with millions of `null` holes.
pub const MAX_INDEX_PADDING: usize = 1 << 16;

/// `true` if `segment` is an array index in canonical form.
///
/// Leading zeros are rejected so that `"01"` stays an object key, and so
/// are numbers beyond `usize`.
///
/// # Example
///
/// ```
/// use formstate_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("42"));
/// assert!(!is_valid_index("01"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index("name"));
/// ```
pub fn is_valid_index(segment: &str) -> bool {
    index_of(segment).is_some()
}

/// Parse a segment as an array index, if it is one.
pub fn index_of(segment: &str) -> Option<usize> {
    let canonical = match segment.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        digits => digits.iter().all(u8::is_ascii_digit),
    };
    canonical.then(|| segment.parse().ok()).flatten()
}

/// `true` if writing `index` into an array of `len` items stays within
/// [`MAX_INDEX_PADDING`].
pub fn within_padding(len: usize, index: usize) -> bool {
    index < len.saturating_add(MAX_INDEX_PADDING)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("POINTER_INVALID")]
    PointerInvalid,
    #[error("POINTER_TOO_LONG")]
    PointerTooLong,
    #[error("PATH_TOO_LONG")]
    PathTooLong,
}
