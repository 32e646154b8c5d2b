//! Hash-chained events.
//!
//! An [`Event`] is a content-addressed action node:
//!
//! ```text
//! {"parent": "<hash or empty>", "handler": "<name>", "args": {...}}
//! ```
//!
//! Its identity is the hash of exactly that object (see [`crate::hash`]).
//! Events are built with an [`EventBuilder`] and are immutable afterwards,
//! so the cached hash can never drift from the content it was computed
//! over. Deserialization goes through the builder too.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::container::{ContainerError, PathKey, path_from_value, path_to_value};
use crate::error::ErrorCode;
use crate::hash::hash_object;
use crate::index::Manageable;
use crate::primitive::Primitive;

/// Builtin handler: `args.path` (list) and `args.value` (any).
pub const SET: &str = "SET";

/// Builtin handler: `args.path` (list).
pub const DELETE: &str = "DELETE";

/// Errors from translating an event into primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The handler name is not a builtin.
    #[error("unsupported handler {0:?}")]
    UnsupportedHandler(String),

    /// A required argument is absent.
    #[error("{handler} event has no {name:?} argument")]
    MissingArgument {
        handler: String,
        name: &'static str,
    },

    /// `args.path` is not a list of string / index keys.
    #[error("{handler} event has a bad path argument: {source}")]
    BadPath {
        handler: String,
        #[source]
        source: ContainerError,
    },
}

impl EventError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedHandler(_) => ErrorCode::UnsupportedHandler,
            Self::MissingArgument { .. } => ErrorCode::MissingArgument,
            Self::BadPath { .. } => ErrorCode::BadArgument,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// The hashed form. Field order here is the canonical field order.
#[derive(Serialize)]
struct EventBody<'a> {
    parent: &'a str,
    handler: &'a str,
    args: &'a BTreeMap<String, Value>,
}

/// An immutable, content-addressed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    parent: String,
    handler: String,
    args: BTreeMap<String, Value>,
    hash: String,
}

impl Event {
    /// Start building an event for `handler`.
    pub fn builder(handler: impl Into<String>) -> EventBuilder {
        EventBuilder::new(handler)
    }

    /// Start building a `SET` event.
    pub fn set<P, V>(path: P, value: V) -> EventBuilder
    where
        P: IntoIterator,
        P::Item: Into<PathKey>,
        V: Into<Value>,
    {
        EventBuilder::set(path, value)
    }

    /// Parent hash; empty for a root event.
    #[must_use]
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Returns `true` if this event has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_empty()
    }

    /// Handler name.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Handler arguments.
    #[must_use]
    pub const fn args(&self) -> &BTreeMap<String, Value> {
        &self.args
    }

    /// A single argument.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Content hash (40 hex chars).
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// A builder pre-filled with this event's content, for deriving a new
    /// event. The result has its own hash once built.
    #[must_use]
    pub fn to_builder(&self) -> EventBuilder {
        EventBuilder {
            parent: self.parent.clone(),
            handler: self.handler.clone(),
            args: self.args.clone(),
        }
    }

    /// Translate into the primitives this event applies, in order.
    ///
    /// Translation only looks at the event itself, never at document state.
    ///
    /// # Errors
    ///
    /// [`EventError::UnsupportedHandler`] for non-builtin handlers, or a
    /// missing/ill-shaped argument error.
    pub fn primitives(&self) -> Result<Vec<Primitive>, EventError> {
        match self.handler.as_str() {
            SET => {
                let path = self.path_arg()?;
                let value = self.required("value")?;
                Ok(vec![Primitive::Set {
                    path,
                    value: value.clone(),
                }])
            }
            DELETE => Ok(vec![Primitive::Delete {
                path: self.path_arg()?,
            }]),
            other => Err(EventError::UnsupportedHandler(other.to_string())),
        }
    }

    fn required(&self, name: &'static str) -> Result<&Value, EventError> {
        self.args.get(name).ok_or_else(|| EventError::MissingArgument {
            handler: self.handler.clone(),
            name,
        })
    }

    fn path_arg(&self) -> Result<Vec<PathKey>, EventError> {
        path_from_value(self.required("path")?).map_err(|source| EventError::BadPath {
            handler: self.handler.clone(),
            source,
        })
    }

    fn body(&self) -> EventBody<'_> {
        EventBody {
            parent: &self.parent,
            handler: &self.handler,
            args: &self.args,
        }
    }
}

impl Manageable for Event {
    fn key(&self) -> &str {
        &self.hash
    }

    fn group_key(&self) -> &str {
        &self.parent
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body().serialize(serializer)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    parent: String,
    handler: String,
    #[serde(default)]
    args: Option<BTreeMap<String, Value>>,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEvent::deserialize(deserializer)?;
        Ok(EventBuilder {
            parent: raw.parent,
            handler: raw.handler,
            args: raw.args.unwrap_or_default(),
        }
        .build())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Mutable event under construction. [`EventBuilder::build`] consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBuilder {
    parent: String,
    handler: String,
    args: BTreeMap<String, Value>,
}

impl EventBuilder {
    /// A root event for `handler` with no arguments.
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            parent: String::new(),
            handler: handler.into(),
            args: BTreeMap::new(),
        }
    }

    /// A `SET` event.
    pub fn set<P, V>(path: P, value: V) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathKey>,
        V: Into<Value>,
    {
        let path: Vec<PathKey> = path.into_iter().map(Into::into).collect();
        Self::new(SET)
            .arg("path", path_to_value(&path))
            .arg("value", value)
    }

    /// A `DELETE` event.
    pub fn delete<P>(path: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathKey>,
    {
        let path: Vec<PathKey> = path.into_iter().map(Into::into).collect();
        Self::new(DELETE).arg("path", path_to_value(&path))
    }

    /// Chain onto `parent`.
    #[must_use]
    pub fn parent(mut self, parent: &Event) -> Self {
        parent.hash().clone_into(&mut self.parent);
        self
    }

    /// Chain onto a parent known only by hash. The empty string makes a root.
    #[must_use]
    pub fn parent_hash(mut self, hash: impl Into<String>) -> Self {
        self.parent = hash.into();
        self
    }

    /// Set one argument.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Replace all arguments.
    #[must_use]
    pub fn args(mut self, args: BTreeMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Freeze into an [`Event`], computing its hash.
    #[must_use]
    pub fn build(self) -> Event {
        let body = EventBody {
            parent: &self.parent,
            handler: &self.handler,
            args: &self.args,
        };
        // String keys and serde_json values only: serialization cannot fail.
        let hash = hash_object(&body).expect("event body is always serializable");
        Event {
            parent: self.parent,
            handler: self.handler,
            args: self.args,
            hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{canonicalize, is_hash};
    use serde_json::json;

    #[test]
    fn known_hashes() {
        let e = Event::set(Vec::<PathKey>::new(), json!({"foo": "bar"})).build();
        assert_eq!(e.hash(), "41a772b775b1c4afbbfb42b7a91b3031a712ab42");

        let e = Event::set(["key"], "value").build();
        assert_eq!(e.hash(), "efb6bbc17898ec819e25f585543d37ae5b386f1a");

        let e = Event::builder("handler_name")
            .arg("hello", json!(["world", 5]))
            .arg("before", Value::Null)
            .build();
        assert_eq!(
            canonicalize(&e).unwrap(),
            r#"{"parent":"","handler":"handler_name","args":{"before":null,"hello":["world",5]}}"#
        );
        assert_eq!(e.hash(), "86e5db5fcf8c749146f2adcc23c728769ef2bd98");
    }

    #[test]
    fn identical_content_hashes_equal() {
        let a = Event::builder("X").build();
        let b = Event::builder("X").args(BTreeMap::new()).build();
        assert_eq!(a.hash(), b.hash());
        assert!(is_hash(a.hash()));

        let c = Event::builder("X").arg("k", 1).build();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn chaining_copies_parent_hash() {
        let root = Event::set(Vec::<PathKey>::new(), json!({})).build();
        let child = Event::set(["a"], 1).parent(&root).build();
        assert_eq!(child.parent(), root.hash());
        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(child.group_key(), root.key());
    }

    #[test]
    fn deserialization_recomputes_hash() {
        let e: Event = serde_json::from_value(json!({
            "parent": "",
            "handler": "SET",
            "args": {"path": ["key"], "value": "value"}
        }))
        .unwrap();
        assert_eq!(e.hash(), "efb6bbc17898ec819e25f585543d37ae5b386f1a");

        let back: Event = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn missing_or_null_args_become_empty() {
        let a: Event = serde_json::from_value(json!({"handler": "X"})).unwrap();
        let b: Event = serde_json::from_value(json!({"handler": "X", "args": null})).unwrap();
        assert_eq!(a.hash(), Event::builder("X").build().hash());
        assert_eq!(a, b);
    }

    #[test]
    fn set_translates_to_one_set_primitive() {
        let e = Event::set(["a", "b"], 3).build();
        assert_eq!(e.primitives().unwrap(), vec![Primitive::set(["a", "b"], 3)]);
    }

    #[test]
    fn delete_translates_to_one_delete_primitive() {
        let e = EventBuilder::delete([PathKey::from("l"), PathKey::Index(0)]).build();
        assert_eq!(
            e.primitives().unwrap(),
            vec![Primitive::delete([PathKey::from("l"), PathKey::Index(0)])]
        );
    }

    #[test]
    fn translation_errors() {
        let e = Event::builder("CUSTOM").build();
        assert_eq!(e.primitives().unwrap_err().code(), ErrorCode::UnsupportedHandler);

        let e = Event::builder(SET).arg("value", 1).build();
        let err = e.primitives().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingArgument);
        assert!(err.to_string().contains("\"path\""));

        let e = Event::builder(SET).arg("path", json!([])).build();
        assert_eq!(
            e.primitives().unwrap_err(),
            EventError::MissingArgument {
                handler: SET.into(),
                name: "value"
            }
        );

        let e = Event::builder(SET).arg("path", "a/b").arg("value", 1).build();
        assert_eq!(e.primitives().unwrap_err().code(), ErrorCode::BadArgument);

        let e = Event::builder(DELETE).arg("path", json!([true])).build();
        assert_eq!(e.primitives().unwrap_err().code(), ErrorCode::BadArgument);
    }

    #[test]
    fn to_builder_derives_new_identity() {
        let e = Event::set(["a"], 1).build();
        let f = e.to_builder().arg("value", 2).build();
        assert_ne!(e.hash(), f.hash());
        assert_eq!(e.to_builder().build(), e);
    }
}
