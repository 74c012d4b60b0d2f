//! The structural [`Path`] type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PathError;

/// Longest pointer string accepted by [`Path::parse_pointer`].
pub const MAX_POINTER_LENGTH: usize = 1024;

/// Deepest path accepted by [`Path::parse_pointer`].
pub const MAX_PATH_DEPTH: usize = 256;

/// Conversion of a literal into a path segment.
///
/// Implemented for string-like keys and integer indices so that the
/// [`path!`](crate::path!) macro accepts both.
pub trait IntoSegment {
    fn into_segment(self) -> String;
}

impl IntoSegment for String {
    fn into_segment(self) -> String {
        self
    }
}

impl IntoSegment for &String {
    fn into_segment(self) -> String {
        self.clone()
    }
}

impl IntoSegment for &str {
    fn into_segment(self) -> String {
        self.to_string()
    }
}

macro_rules! index_segment {
    ($($ty:ty),*) => {
        $(
            impl IntoSegment for $ty {
                fn into_segment(self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

index_segment!(usize, u32, u64, i32, i64);

/// Build a [`Path`] from a list of keys and indices.
///
/// ```
/// use formstate_path::{path, Path};
///
/// assert_eq!(path![], Path::root());
/// assert_eq!(path!["items", 0, "name"].to_string(), "/items/0/name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($segment:expr),+ $(,)?) => {
        $crate::Path::from_segments([$($crate::IntoSegment::into_segment($segment)),+])
    };
}

/// An immutable address of a node inside a value tree.
///
/// Two paths are equal iff they hold the same segments in the same order.
/// The empty path is the root and is an ancestor of every other path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<String>);

impl Path {
    /// The root path, addressing the whole tree.
    pub const fn root() -> Self {
        Path(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Path(segments.into_iter().map(Into::into).collect())
    }

    /// Parse an RFC 6901 pointer string (`""` is the root).
    ///
    /// `~0` decodes to `~` and `~1` to `/`; any other escape is invalid.
    ///
    /// ```
    /// use formstate_path::{path, Path, PathError};
    ///
    /// assert_eq!(Path::parse_pointer("/a~1b/0").unwrap(), path!["a/b", 0]);
    /// assert_eq!(Path::parse_pointer("a"), Err(PathError::PointerInvalid));
    /// assert_eq!(Path::parse_pointer("/a~2"), Err(PathError::PointerInvalid));
    /// ```
    pub fn parse_pointer(pointer: &str) -> Result<Self, PathError> {
        let Some(body) = pointer.strip_prefix('/') else {
            return if pointer.is_empty() {
                Ok(Path::root())
            } else {
                Err(PathError::PointerInvalid)
            };
        };
        if pointer.len() > MAX_POINTER_LENGTH {
            return Err(PathError::PointerTooLong);
        }
        let segments = body
            .split('/')
            .map(decode_segment)
            .collect::<Result<Vec<_>, _>>()?;
        if segments.len() > MAX_PATH_DEPTH {
            return Err(PathError::PathTooLong);
        }
        Ok(Path(segments))
    }

    /// Check a pointer string without keeping the parsed path.
    pub fn validate_pointer(pointer: &str) -> Result<(), PathError> {
        Path::parse_pointer(pointer).map(drop)
    }

    /// Format as an RFC 6901 pointer string.
    pub fn to_pointer(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            out.push('/');
            for c in segment.chars() {
                match c {
                    '~' => out.push_str("~0"),
                    '/' => out.push_str("~1"),
                    c => out.push(c),
                }
            }
        }
        out
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    /// A new path with one more segment.
    pub fn join(&self, segment: impl IntoSegment) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into_segment());
        Path(segments)
    }

    pub fn concat(&self, other: &Path) -> Path {
        let mut segments = Vec::with_capacity(self.0.len() + other.0.len());
        segments.extend_from_slice(&self.0);
        segments.extend_from_slice(&other.0);
        Path(segments)
    }

    /// The first `len` segments of this path.
    pub fn truncate(&self, len: usize) -> Path {
        Path(self.0[..len.min(self.0.len())].to_vec())
    }

    /// `true` if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// `true` if this path is a strict ancestor of `other`.
    ///
    /// ```
    /// use formstate_path::path;
    ///
    /// assert!(path!["a"].is_ancestor_of(&path!["a", "b"]));
    /// assert!(path![].is_ancestor_of(&path!["a"]));
    /// assert!(!path!["a"].is_ancestor_of(&path!["a"]));
    /// assert!(!path!["a", "b"].is_ancestor_of(&path!["a"]));
    /// ```
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.0.len() < other.0.len() && other.starts_with(self)
    }

    /// `true` if the paths are equal or one is an ancestor of the other.
    pub fn is_related(&self, other: &Path) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// The remainder of this path below `prefix`.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.0.strip_prefix(prefix.0.as_slice()).map(|rest| Path(rest.to_vec()))
    }

    /// Longest path that is an ancestor-or-self of every given path.
    ///
    /// An empty input yields the root.
    pub fn common_prefix<'a, I>(paths: I) -> Path
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut paths = paths.into_iter();
        let Some(first) = paths.next() else {
            return Path::root();
        };
        let mut len = first.0.len();
        for path in paths {
            len = first.0[..len]
                .iter()
                .zip(&path.0)
                .take_while(|(a, b)| a == b)
                .count();
            if len == 0 {
                break;
            }
        }
        first.truncate(len)
    }
}

fn decode_segment(raw: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(PathError::PointerInvalid),
        }
    }
    Ok(out)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pointer())
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Path(segments)
    }
}

impl From<&[String]> for Path {
    fn from(segments: &[String]) -> Self {
        Path(segments.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Self {
        Path::from_segments(segments)
    }
}

impl FromIterator<String> for Path {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl AsRef<[String]> for Path {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}
