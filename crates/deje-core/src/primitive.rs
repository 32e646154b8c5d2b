//! Reversible state mutations.
//!
//! Every event translates into a list of primitives. There are two:
//!
//! | Primitive | Effect | Reversal |
//! |---|---|---|
//! | `Set{path, value}` | replace the value at `path` (the whole root if empty) | `Set{[], prior root}` |
//! | `Delete{path}` | remove the child at `path` | `Set{[], prior root}` |
//!
//! Reversal always snapshots the entire prior root. This is O(document size)
//! per reversal but holds no matter how deep or structural the change was.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::{Container, ContainerError, PathKey, render_path, traverse};
use crate::error::ErrorCode;

/// Errors from applying a primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    /// Traversal to the addressed child failed.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// `Delete` with an empty path.
    #[error("cannot delete the root container")]
    CannotDeleteRoot,
}

impl PrimitiveError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Container(e) => e.code(),
            Self::CannotDeleteRoot => ErrorCode::CannotDeleteRoot,
        }
    }
}

/// A minimal state mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Primitive {
    /// Replace the value at `path`.
    Set { path: Vec<PathKey>, value: Value },
    /// Remove the child at `path`.
    Delete { path: Vec<PathKey> },
}

impl Primitive {
    /// Build a `Set` primitive.
    pub fn set<P, V>(path: P, value: V) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathKey>,
        V: Into<Value>,
    {
        Self::Set {
            path: path.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }

    /// Build a `Delete` primitive.
    pub fn delete<P>(path: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathKey>,
    {
        Self::Delete {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// The path this primitive addresses.
    #[must_use]
    pub fn path(&self) -> &[PathKey] {
        match self {
            Self::Set { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Apply to a root container.
    ///
    /// # Errors
    ///
    /// [`PrimitiveError::CannotDeleteRoot`] for a root delete, or the
    /// container error from traversing to the parent of the target.
    pub fn apply_to(&self, root: &mut Container) -> Result<(), PrimitiveError> {
        match self {
            Self::Set { path, value } => {
                if path.is_empty() {
                    *root = Container::from(value.clone());
                    return Ok(());
                }
                let (parent, last) = traverse(root, path)?;
                parent.set_child(last, Container::from(value.clone()))?;
            }
            Self::Delete { path } => {
                if path.is_empty() {
                    return Err(PrimitiveError::CannotDeleteRoot);
                }
                let (parent, last) = traverse(root, path)?;
                parent.remove_child(last)?;
            }
        }
        Ok(())
    }

    /// The primitive that undoes `self`, computed against the root as it is
    /// *before* `self` is applied.
    #[must_use]
    pub fn reverse(&self, root: &Container) -> Self {
        Self::Set {
            path: Vec::new(),
            value: root.export(),
        }
    }

    /// Short description for logs, e.g. `set /a/b`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Set { path, .. } => format!("set {}", render_path(path)),
            Self::Delete { path } => format!("delete {}", render_path(path)),
        }
    }
}
