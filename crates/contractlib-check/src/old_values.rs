//! Scope-keyed memory of "old" values.
//!
//! A precondition block stashes snapshots into the [`OldValueBag`] of its
//! [`ScopeKey`]; the matching postcondition block reads them back. Bags live
//! until explicitly forgotten.

use std::collections::HashMap;

use indexmap::IndexMap;

use contractlib_core::{ResolvedScope, ScopeError, ScopeKey, Value};

/// Named snapshots belonging to one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OldValueBag {
    values: IndexMap<String, Value>,
}

impl OldValueBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot, replacing any earlier one under the same name.
    pub fn stash(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn has_stashed(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn unpack(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Names in the order they were first stashed.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Mapping from scope to its bag. At most one bag per scope.
#[derive(Debug, Default)]
pub struct OldValueStore {
    bags: HashMap<ScopeKey, OldValueBag>,
}

impl OldValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stashes `value` under `name` for the resolved scope.
    ///
    /// Only a precondition block may stash; anything else fails with
    /// [`ScopeError::Discipline`]. This is the one place the rule is checked.
    /// A second stash for the same scope merges into the existing bag.
    pub fn stash(
        &mut self,
        scope: &ResolvedScope,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), ScopeError> {
        scope.ensure_recording()?;

        let name = name.into();
        tracing::trace!(scope = %scope.key, name = %name, "stashing old value");

        if let Some(bag) = self.bags.get_mut(&scope.key) {
            bag.stash(name, value);
        } else {
            tracing::debug!(scope = %scope.key, "creating old value bag");
            let mut bag = OldValueBag::new();
            bag.stash(name, value);
            self.bags.insert(scope.key.clone(), bag);
        }
        Ok(())
    }

    /// Returns the snapshot stashed under `name`, if any. Absence is normal.
    pub fn fetch(&self, key: &ScopeKey, name: &str) -> Option<&Value> {
        self.bags.get(key).and_then(|bag| bag.unpack(name))
    }

    pub fn bag(&self, key: &ScopeKey) -> Option<&OldValueBag> {
        self.bags.get(key)
    }

    /// Drops the whole bag for `key`. Returns whether one existed.
    pub fn forget(&mut self, key: &ScopeKey) -> bool {
        let removed = self.bags.remove(key).is_some();
        if removed {
            tracing::debug!(scope = %key, "forgot old value bag");
        }
        removed
    }

    /// Number of scopes currently holding memory.
    pub fn scope_count(&self) -> usize {
        self.bags.len()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopeKey> {
        self.bags.keys()
    }

    /// Drops every bag, e.g. after an aborted call left some behind.
    pub fn clear(&mut self) {
        if !self.bags.is_empty() {
            tracing::debug!(scopes = self.bags.len(), "clearing old value store");
        }
        self.bags.clear();
    }
}
