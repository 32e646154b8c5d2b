//! Content-addressed storage with a secondary grouping.
//!
//! Events, quorums and timestamps are all stored the same way: a primary
//! index by their own key and a secondary index by a group key (parent hash,
//! event hash, block height). [`Index`] implements that once for any
//! [`Manageable`] type.
//!
//! Invariant: a group exists only while it has at least one member, so
//! register-then-unregister leaves the index exactly as it was.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

/// A value that can live in an [`Index`].
///
/// Both keys must be stable for the lifetime of the value; entity types
/// guarantee this by being immutable once built.
pub trait Manageable {
    /// Primary key (normally the content hash).
    fn key(&self) -> &str;

    /// Secondary grouping key. The empty string is a valid group.
    fn group_key(&self) -> &str;
}

/// Primary + secondary index over [`Manageable`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index<T> {
    items: BTreeMap<String, T>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl<T> Default for Index<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }
}

impl<T: Manageable> Index<T> {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item`. Returns `false` (and drops `item`) if its key is
    /// already present.
    pub fn register(&mut self, item: T) -> bool {
        let key = item.key().to_string();
        if self.items.contains_key(&key) {
            return false;
        }
        let group = item.group_key().to_string();
        debug!(key = %key, group = %group, "register");
        self.groups.entry(group).or_default().insert(key.clone());
        self.items.insert(key, item);
        true
    }

    /// Remove the item stored under `key`, dropping its group if it was
    /// the last member.
    pub fn unregister(&mut self, key: &str) -> Option<T> {
        let item = self.items.remove(key)?;
        let group = item.group_key();
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(key);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
        debug!(key = %key, group = %group, "unregister");
        Some(item)
    }

    /// Look up by primary key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    /// Returns `true` if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Members of `group`, in key order. Empty if the group does not exist.
    pub fn group(&self, group: &str) -> impl Iterator<Item = &T> {
        self.groups
            .get(group)
            .into_iter()
            .flatten()
            .filter_map(move |key| self.items.get(key))
    }

    /// Keys of the members of `group`.
    #[must_use]
    pub fn group_keys(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(group)
    }

    /// Returns `true` if `group` has at least one member.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Number of non-empty groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All items in key order, without keys.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }
}

impl<T: Manageable> FromIterator<T> for Index<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut index = Self::new();
        for item in iter {
            index.register(item);
        }
        index
    }
}

impl<T: Manageable> Extend<T> for Index<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.register(item);
        }
    }
}
