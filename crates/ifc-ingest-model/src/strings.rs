// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! String interning for repeated text (type names, ids, property names)

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Handle to an interned string
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StringId(pub u32);

impl StringId {
    /// The empty string, always present
    pub const EMPTY: StringId = StringId(0);

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

#[derive(Default)]
struct Interned {
    lookup: FxHashMap<Arc<str>, StringId>,
    values: Vec<Arc<str>>,
}

/// Thread-safe string interner
///
/// Interning is append-only: a handle stays valid for the lifetime of the
/// table. Tables built on top of a shared interner may keep interning after
/// `build()` when lazily hydrated rows are first read.
pub struct StringTable {
    inner: RwLock<Interned>,
}

impl StringTable {
    pub fn new() -> Self {
        let empty: Arc<str> = Arc::from("");
        let mut interned = Interned::default();
        interned.lookup.insert(empty.clone(), StringId::EMPTY);
        interned.values.push(empty);

        Self {
            inner: RwLock::new(interned),
        }
    }

    /// Create a shareable table
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Intern `value`, returning the existing handle if already present
    pub fn intern(&self, value: &str) -> StringId {
        if let Some(id) = self.lookup(value) {
            return id;
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have won the race between the two locks
        if let Some(id) = inner.lookup.get(value) {
            return *id;
        }

        let id = StringId(inner.values.len() as u32);
        let stored: Arc<str> = Arc::from(value);
        inner.values.push(stored.clone());
        inner.lookup.insert(stored, id);
        id
    }

    /// Handle for `value` if it has been interned
    pub fn lookup(&self, value: &str) -> Option<StringId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.lookup.get(value).copied()
    }

    /// Text behind a handle
    pub fn resolve(&self, id: StringId) -> Option<Arc<str>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.values.get(id.0 as usize).cloned()
    }

    /// Number of distinct strings, including the empty string
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StringTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringTable").field("len", &self.len()).finish()
    }
}
