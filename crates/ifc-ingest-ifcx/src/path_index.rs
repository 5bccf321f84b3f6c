// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-layer path resolution
//!
//! IFCX nodes are addressed either by UUID or by a hierarchical path made
//! of a root UUID followed by child names (`"a1b2/Storey/Wall"`). The index
//! is built in two phases:
//!
//! 1. every layer's `children` declarations are unioned per parent UUID,
//!    a stronger layer winning a name clash
//! 2. a depth-first walk from every root records `path → uuid` for every
//!    reachable descendant
//!
//! Lookups never fail loudly: an unknown path resolves to `None`.

use crate::layer::IfcxLayer;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the index knows about one UUID
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathEntry {
    pub uuid: String,
    /// Hierarchical paths that reach this node
    pub paths: Vec<String>,
    /// Ids of layers that declare this node, strongest first
    pub layers: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PathIndex {
    pub by_uuid: FxHashMap<String, PathEntry>,
    pub by_hierarchy: FxHashMap<String, String>,
    pub child_name_index: FxHashMap<String, BTreeMap<String, String>>,
}

impl PathIndex {
    /// Build over `layers`, given strongest first
    pub fn build(layers: &[Arc<IfcxLayer>]) -> Self {
        let mut index = Self::default();

        // Weakest first, so stronger and later declarations overwrite
        for layer in layers.iter().rev() {
            for node in layer.nodes() {
                if !is_hierarchical(&node.path) {
                    let entry = index.entry_mut(&node.path);
                    if !entry.layers.contains(&layer.id) {
                        entry.layers.push(layer.id.clone());
                    }
                }
                for (name, child) in node.children() {
                    if !is_hierarchical(child) {
                        index.entry_mut(child);
                    }
                    index
                        .child_name_index
                        .entry(node.path.clone())
                        .or_default()
                        .insert(name.to_string(), child.to_string());
                }
            }
        }
        for entry in index.by_uuid.values_mut() {
            entry.layers.reverse();
        }

        index.walk();
        if index.fold_hierarchical_parents() {
            index.walk();
        }

        log::debug!(
            "path index: {} uuids, {} hierarchical paths over {} layers",
            index.by_uuid.len(),
            index.by_hierarchy.len(),
            layers.len()
        );
        index
    }

    fn entry_mut(&mut self, uuid: &str) -> &mut PathEntry {
        self.by_uuid
            .entry(uuid.to_string())
            .or_insert_with(|| PathEntry {
                uuid: uuid.to_string(),
                ..Default::default()
            })
    }

    /// UUIDs that are nobody's child, or every UUID when none qualify
    pub fn roots(&self) -> Vec<&str> {
        let children: FxHashSet<&str> = self
            .child_name_index
            .values()
            .flat_map(|children| children.values().map(String::as_str))
            .collect();
        let mut roots: Vec<&str> = self
            .by_uuid
            .keys()
            .map(String::as_str)
            .filter(|uuid| !children.contains(uuid))
            .collect();
        if roots.is_empty() {
            roots = self.by_uuid.keys().map(String::as_str).collect();
        }
        roots.sort_unstable();
        roots
    }

    /// Phase 2: record every reachable hierarchical path
    fn walk(&mut self) {
        self.by_hierarchy.clear();
        for entry in self.by_uuid.values_mut() {
            entry.paths.clear();
        }

        let roots: Vec<String> = self.roots().into_iter().map(str::to_string).collect();
        let mut found: Vec<(String, String)> = Vec::new();
        for root in roots {
            let mut visited: FxHashSet<&str> = FxHashSet::default();
            visited.insert(root.as_str());
            let mut stack = vec![(root.as_str(), root.clone())];

            while let Some((uuid, path)) = stack.pop() {
                let Some(children) = self.child_name_index.get(uuid) else {
                    continue;
                };
                for (name, child) in children {
                    // Stop on revisits so cyclic declarations terminate
                    if !visited.insert(child.as_str()) {
                        continue;
                    }
                    let child_path = format!("{}/{}", path, name);
                    found.push((child_path.clone(), child.clone()));
                    stack.push((child.as_str(), child_path));
                }
            }
        }

        for (path, uuid) in found {
            if let Some(entry) = self.by_uuid.get_mut(&uuid) {
                entry.paths.push(path.clone());
            }
            self.by_hierarchy.entry(path).or_insert(uuid);
        }
    }

    /// Move children declared under a hierarchical parent path onto the
    /// UUID that path resolves to; returns whether anything moved
    fn fold_hierarchical_parents(&mut self) -> bool {
        let parents: Vec<(String, String)> = self
            .child_name_index
            .keys()
            .filter(|parent| is_hierarchical(parent))
            .filter_map(|parent| Some((parent.clone(), self.resolve_path(parent)?.to_string())))
            .collect();

        for (parent, uuid) in &parents {
            let Some(children) = self.child_name_index.remove(parent) else {
                continue;
            };
            let target = self.child_name_index.entry(uuid.clone()).or_default();
            for (name, child) in children {
                target.entry(name).or_insert(child);
            }
        }
        !parents.is_empty()
    }

    /// Resolve a UUID or hierarchical path to a UUID
    pub fn resolve_path(&self, path: &str) -> Option<&str> {
        if let Some((uuid, _)) = self.by_uuid.get_key_value(path) {
            return Some(uuid.as_str());
        }
        if let Some(uuid) = self.by_hierarchy.get(path) {
            return Some(uuid.as_str());
        }

        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        let (mut current, _) = self.by_uuid.get_key_value(segments.next()?)?;
        for segment in segments {
            current = self.child_name_index.get(current)?.get(segment)?;
        }
        Some(current.as_str())
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.resolve_path(path).is_some()
    }

    pub fn entry(&self, uuid: &str) -> Option<&PathEntry> {
        self.by_uuid.get(uuid)
    }

    /// Unioned children of a UUID, by name
    pub fn children_of(&self, uuid: &str) -> Option<&BTreeMap<String, String>> {
        self.child_name_index.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }
}

fn is_hierarchical(path: &str) -> bool {
    path.contains('/')
}
