//! Materialized document state.
//!
//! [`DocumentState`] owns the root [`Container`] and is only mutated through
//! [`Primitive`] application. It also keeps a log of which event batches
//! have been applied since the last reset, and can relay every applied
//! primitive to an attached [`Broadcaster`].

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::broadcast::Broadcaster;
use crate::container::{Container, PathKey};
use crate::primitive::{Primitive, PrimitiveError};

/// The owned container tree plus its replay log.
#[derive(Debug, Default)]
pub struct DocumentState {
    root: Container,
    applied: Vec<String>,
    observer: Option<Arc<Broadcaster<Primitive>>>,
}

impl DocumentState {
    /// An empty-map state with no observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay every successfully applied primitive to `broadcaster`,
    /// replacing any previous observer.
    pub fn attach(&mut self, broadcaster: Arc<Broadcaster<Primitive>>) {
        self.observer = Some(broadcaster);
    }

    /// Stop relaying primitives.
    pub fn detach(&mut self) -> Option<Arc<Broadcaster<Primitive>>> {
        self.observer.take()
    }

    /// Reset to an empty map and clear the replay log.
    ///
    /// Observers see this as `Set{[], {}}`.
    pub fn reset(&mut self) {
        let clear = Primitive::set(Vec::<PathKey>::new(), Value::Object(serde_json::Map::new()));
        self.root = Container::empty_map();
        self.applied.clear();
        self.notify(clear);
    }

    /// Apply one primitive.
    ///
    /// # Errors
    ///
    /// Propagates the primitive's error; the state is unchanged on failure.
    pub fn apply(&mut self, primitive: &Primitive) -> Result<(), PrimitiveError> {
        primitive.apply_to(&mut self.root)?;
        trace!(primitive = %primitive.describe(), "applied primitive");
        self.notify(primitive.clone());
        Ok(())
    }

    /// Apply one primitive and return the primitive that undoes it.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentState::apply`].
    pub fn apply_reversible(&mut self, primitive: &Primitive) -> Result<Primitive, PrimitiveError> {
        let reversal = primitive.reverse(&self.root);
        self.apply(primitive)?;
        Ok(reversal)
    }

    /// Note that the primitives of `event_hash` have been applied.
    pub fn record_batch(&mut self, event_hash: &str) {
        self.applied.push(event_hash.to_string());
    }

    /// Event hashes applied since the last reset, oldest first.
    #[must_use]
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// The hash of the most recently applied event batch.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.applied.last().map(String::as_str)
    }

    /// The root container.
    #[must_use]
    pub const fn root(&self) -> &Container {
        &self.root
    }

    /// Plain JSON export of the whole state.
    #[must_use]
    pub fn export(&self) -> Value {
        self.root.export()
    }

    /// Plain JSON export of the value at `path`, if it resolves.
    #[must_use]
    pub fn get(&self, path: &[PathKey]) -> Option<Value> {
        self.root.get(path).map(Container::export)
    }

    fn notify(&self, primitive: Primitive) {
        if let Some(observer) = &self.observer {
            observer.send(primitive);
        }
    }
}
