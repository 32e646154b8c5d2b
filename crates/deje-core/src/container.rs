//! Recursive document-state containers.
//!
//! A [`Container`] is the in-memory form of a JSON-shaped value: a map of
//! named children, a dense list of children, or a scalar leaf. Every child is
//! exclusively owned by its parent; the root is owned by
//! [`crate::state::DocumentState`].
//!
//! Containers are addressed by paths of [`PathKey`]s. String keys index maps,
//! non-negative integers index lists. Setting a list index past the current
//! length pads the intermediate slots with null scalars, up to
//! [`MAX_LIST_PAD`] slots at a time.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::ErrorCode;

/// Most null slots a single list set may insert before the new element.
///
/// Paths come from untrusted events, so growth per set is bounded.
pub const MAX_LIST_PAD: usize = 4096;

// ---------------------------------------------------------------------------
// Path keys
// ---------------------------------------------------------------------------

/// One segment of a container path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    /// List position.
    Index(usize),
    /// Map key.
    Key(String),
}

impl PathKey {
    /// Interpret a JSON value as a path segment.
    ///
    /// Strings become map keys; non-negative integral numbers become list
    /// indices.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::InvalidPathKey`] for any other value.
    pub fn from_value(value: &Value) -> Result<Self, ContainerError> {
        match value {
            Value::String(s) => Ok(Self::Key(s.clone())),
            Value::Number(n) => number_to_index(n)
                .map(Self::Index)
                .ok_or_else(|| ContainerError::InvalidPathKey(value.to_string())),
            other => Err(ContainerError::InvalidPathKey(other.to_string())),
        }
    }

    /// JSON form of this segment.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Index(i) => Value::from(*i),
            Self::Key(k) => Value::String(k.clone()),
        }
    }
}

fn number_to_index(n: &Number) -> Option<usize> {
    if let Some(u) = n.as_u64() {
        return usize::try_from(u).ok();
    }
    let f = n.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = f as usize;
        Some(index)
    } else {
        None
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Parse a JSON array into a path.
///
/// # Errors
///
/// Returns [`ContainerError::InvalidPathKey`] if `value` is not an array or
/// any element is not a valid segment.
pub fn path_from_value(value: &Value) -> Result<Vec<PathKey>, ContainerError> {
    let Value::Array(items) = value else {
        return Err(ContainerError::InvalidPathKey(value.to_string()));
    };
    items.iter().map(PathKey::from_value).collect()
}

/// JSON array form of a path.
#[must_use]
pub fn path_to_value(path: &[PathKey]) -> Value {
    Value::Array(path.iter().map(PathKey::to_value).collect())
}

/// Render a path for diagnostics, e.g. `/a/0/b`. The empty path renders as `/`.
#[must_use]
pub fn render_path(path: &[PathKey]) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    path.iter().fold(String::new(), |mut out, key| {
        out.push('/');
        out.push_str(&key.to_string());
        out
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Container variant, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Map,
    List,
    Scalar,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Map => "map",
            Self::List => "list",
            Self::Scalar => "scalar",
        })
    }
}

/// Errors from container construction and traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// The value has no JSON representation.
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    /// A path segment's type does not match the container it indexes.
    #[error("key {key:?} cannot index a {kind}")]
    BadKeyType { key: PathKey, kind: ContainerKind },

    /// A path segment is neither a string nor a non-negative integer.
    #[error("invalid path key: {0}")]
    InvalidPathKey(String),

    /// An intermediate segment does not resolve to a container.
    #[error("no such path: {0}")]
    NoSuchPath(String),

    /// Traversal needs at least one key.
    #[error("empty path: traversal needs at least one key")]
    EmptyPath,

    /// A list set would pad more than [`MAX_LIST_PAD`] slots.
    #[error("list index {index} is too far past the end (length {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

impl ContainerError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedType(_) => ErrorCode::UnsupportedType,
            Self::BadKeyType { .. } | Self::InvalidPathKey(_) => ErrorCode::BadKeyType,
            Self::NoSuchPath(_) => ErrorCode::NoSuchPath,
            Self::EmptyPath => ErrorCode::EmptyPath,
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A childless JSON primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// JSON form of this scalar.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A node of the document state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    Map(BTreeMap<String, Container>),
    List(Vec<Container>),
    Scalar(Scalar),
}

impl Default for Container {
    fn default() -> Self {
        Self::empty_map()
    }
}

impl Container {
    /// An empty map, the initial root of every document.
    #[must_use]
    pub const fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// A null scalar.
    #[must_use]
    pub const fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    /// Classify any serializable value into a container tree.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::UnsupportedType`] if `value` has no JSON
    /// representation (for example a map keyed by non-strings).
    pub fn make<T>(value: &T) -> Result<Self, ContainerError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(|e| ContainerError::UnsupportedType(e.to_string()))
    }

    /// Which variant this container is.
    #[must_use]
    pub const fn kind(&self) -> ContainerKind {
        match self {
            Self::Map(_) => ContainerKind::Map,
            Self::List(_) => ContainerKind::List,
            Self::Scalar(_) => ContainerKind::Scalar,
        }
    }

    /// Flatten to a plain JSON value.
    #[must_use]
    pub fn export(&self) -> Value {
        match self {
            Self::Map(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), v.export()))
                    .collect(),
            ),
            Self::List(children) => Value::Array(children.iter().map(Self::export).collect()),
            Self::Scalar(s) => s.to_value(),
        }
    }

    /// Look up the container at `path`. The empty path is the container itself.
    #[must_use]
    pub fn get(&self, path: &[PathKey]) -> Option<&Self> {
        path.iter()
            .try_fold(self, |current, key| current.child(key).ok())
    }

    /// Borrow a direct child.
    ///
    /// # Errors
    ///
    /// [`ContainerError::BadKeyType`] if `key` does not fit this container's
    /// kind, [`ContainerError::NoSuchPath`] if the child is absent or this is
    /// a scalar.
    pub fn child(&self, key: &PathKey) -> Result<&Self, ContainerError> {
        let found = match (self, key) {
            (Self::Map(children), PathKey::Key(k)) => children.get(k),
            (Self::List(children), PathKey::Index(i)) => children.get(*i),
            (Self::Scalar(_), _) => None,
            (other, key) => return Err(bad_key(key, other.kind())),
        };
        found.ok_or_else(|| ContainerError::NoSuchPath(render_path(std::slice::from_ref(key))))
    }

    fn child_mut(&mut self, key: &PathKey) -> Result<&mut Self, ContainerError> {
        let kind = self.kind();
        let found = match (self, key) {
            (Self::Map(children), PathKey::Key(k)) => children.get_mut(k),
            (Self::List(children), PathKey::Index(i)) => children.get_mut(*i),
            (Self::Scalar(_), _) => None,
            (_, key) => return Err(bad_key(key, kind)),
        };
        found.ok_or_else(|| ContainerError::NoSuchPath(render_path(std::slice::from_ref(key))))
    }

    /// Set a direct child, replacing any previous value at `key`.
    ///
    /// List parents grow as needed: intermediate slots become null scalars.
    ///
    /// # Errors
    ///
    /// [`ContainerError::BadKeyType`] on a kind mismatch,
    /// [`ContainerError::NoSuchPath`] if this is a scalar,
    /// [`ContainerError::IndexOutOfRange`] if padding would exceed
    /// [`MAX_LIST_PAD`].
    pub fn set_child(&mut self, key: &PathKey, value: Self) -> Result<(), ContainerError> {
        match (self, key) {
            (Self::Map(children), PathKey::Key(k)) => {
                children.insert(k.clone(), value);
                Ok(())
            }
            (Self::List(children), PathKey::Index(i)) => {
                let i = *i;
                let len = children.len();
                if i < len {
                    children[i] = value;
                } else if i - len > MAX_LIST_PAD {
                    return Err(ContainerError::IndexOutOfRange { index: i, len });
                } else {
                    children.resize_with(i, Self::null);
                    children.push(value);
                }
                Ok(())
            }
            (Self::Scalar(_), key) => Err(ContainerError::NoSuchPath(render_path(
                std::slice::from_ref(key),
            ))),
            (other, key) => Err(bad_key(key, other.kind())),
        }
    }

    /// Remove a direct child and return it.
    ///
    /// Removing an absent map key or an out-of-range index is a no-op.
    /// Removing a list element shifts every later element down by one.
    ///
    /// # Errors
    ///
    /// [`ContainerError::BadKeyType`] on a kind mismatch,
    /// [`ContainerError::NoSuchPath`] if this is a scalar.
    pub fn remove_child(&mut self, key: &PathKey) -> Result<Option<Self>, ContainerError> {
        match (self, key) {
            (Self::Map(children), PathKey::Key(k)) => Ok(children.remove(k)),
            (Self::List(children), PathKey::Index(i)) => {
                Ok((*i < children.len()).then(|| children.remove(*i)))
            }
            (Self::Scalar(_), key) => Err(ContainerError::NoSuchPath(render_path(
                std::slice::from_ref(key),
            ))),
            (other, key) => Err(bad_key(key, other.kind())),
        }
    }
}

fn bad_key(key: &PathKey, kind: ContainerKind) -> ContainerError {
    ContainerError::BadKeyType {
        key: key.clone(),
        kind,
    }
}

/// Walk `root` along all but the last segment of `path`.
///
/// Returns the parent container and the final key, so callers can set or
/// remove the addressed child.
///
/// # Errors
///
/// [`ContainerError::EmptyPath`] for an empty path (root operations are the
/// caller's job), [`ContainerError::BadKeyType`] on a kind mismatch, and
/// [`ContainerError::NoSuchPath`] if an intermediate segment is missing or
/// lands on a scalar.
pub fn traverse<'a, 'p>(
    root: &'a mut Container,
    path: &'p [PathKey],
) -> Result<(&'a mut Container, &'p PathKey), ContainerError> {
    let Some((last, prefix)) = path.split_last() else {
        return Err(ContainerError::EmptyPath);
    };
    let mut current = root;
    for (depth, key) in prefix.iter().enumerate() {
        current = current.child_mut(key).map_err(|err| match err {
            ContainerError::NoSuchPath(_) => {
                ContainerError::NoSuchPath(render_path(&prefix[..=depth]))
            }
            other => other,
        })?;
    }
    Ok((current, last))
}

impl From<Value> for Container {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl Serialize for Container {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Map(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (k, v) in children {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::List(children) => {
                let mut seq = serializer.serialize_seq(Some(children.len()))?;
                for v in children {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Self::Scalar(s) => s.to_value().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Container {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
