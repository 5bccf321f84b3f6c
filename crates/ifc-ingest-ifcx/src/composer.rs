// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Strongest-wins layer composition
//!
//! For every path declared by an enabled layer the composer produces one
//! [`ComposedNode`]:
//!
//! - attributes merge per key, the strongest layer declaring a key wins
//!   and within one layer the later declaration wins
//! - children and inheritance targets are unioned, a stronger layer
//!   winning a name clash
//! - inherited attributes and children only fill keys the node does not
//!   declare itself
//!
//! Paths and reference targets are canonicalized through the [`PathIndex`]
//! so that `"site/Building"` and the building's UUID land on the same node.

use crate::path_index::PathIndex;
use crate::stack::LayerSnapshot;
use ifc_ingest_model::{phase, ProgressReporter, YieldPoint};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_MAX_INHERIT_DEPTH: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeOptions {
    /// Inheritance hops followed before resolution stops
    pub max_inherit_depth: usize,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            max_inherit_depth: DEFAULT_MAX_INHERIT_DEPTH,
        }
    }
}

/// Merged view of one path across all enabled layers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposedNode {
    pub path: String,
    pub attributes: BTreeMap<String, Value>,
    /// Child name → canonical path
    pub children: BTreeMap<String, String>,
    /// Inheritance name → canonical path
    pub inherits: BTreeMap<String, String>,
    /// Every layer that declared this path, strongest first
    pub contributing_layers: Vec<String>,
}

impl ComposedNode {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)?.as_str()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionStats {
    pub layers_used: usize,
    pub inheritance_resolutions: usize,
    pub cross_layer_references: usize,
    pub node_count: usize,
}

/// Result of one composition pass
#[derive(Clone, Debug, Default)]
pub struct Composition {
    /// Composed nodes by canonical path, in path order
    pub nodes: BTreeMap<String, ComposedNode>,
    pub stats: CompositionStats,
    pub path_index: PathIndex,
    /// Canonical path → contributing layer ids, strongest first
    pub path_to_layers: FxHashMap<String, Vec<String>>,
}

impl Composition {
    /// Node at a UUID or hierarchical path
    pub fn get(&self, path: &str) -> Option<&ComposedNode> {
        let canonical = self.path_index.resolve_path(path).unwrap_or(path);
        self.nodes.get(canonical)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Compose the layers of `snapshot`
pub fn compose(
    snapshot: &LayerSnapshot,
    options: &ComposeOptions,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
) -> Composition {
    let layers = snapshot.enabled_layers();

    progress.start(phase::COMPOSE_INDEX);
    let path_index = PathIndex::build(layers);
    progress.finish(phase::COMPOSE_INDEX);

    progress.start(phase::COMPOSE_MERGE);
    let canonical = |path: &str| path_index.resolve_path(path).unwrap_or(path).to_string();
    let mut nodes: BTreeMap<String, ComposedNode> = BTreeMap::new();
    // Targets referenced from a layer that does not declare them
    let mut foreign_refs: Vec<String> = Vec::new();

    // Weakest first, so stronger and later declarations overwrite
    for (done, layer) in layers.iter().rev().enumerate() {
        let declared: FxHashSet<String> =
            layer.nodes().iter().map(|node| canonical(&node.path)).collect();

        for declaration in layer.nodes() {
            let path = canonical(&declaration.path);
            let node = nodes.entry(path.clone()).or_insert_with(|| ComposedNode {
                path,
                ..Default::default()
            });
            if !node.contributing_layers.contains(&layer.id) {
                node.contributing_layers.push(layer.id.clone());
            }

            for (key, value) in declaration.attributes() {
                node.attributes.insert(key.to_string(), value.clone());
            }
            for (name, target) in declaration.children() {
                let target = canonical(target);
                if !declared.contains(&target) {
                    foreign_refs.push(target.clone());
                }
                node.children.insert(name.to_string(), target);
            }
            for (name, target) in declaration.inherits() {
                let target = canonical(target);
                if !declared.contains(&target) {
                    foreign_refs.push(target.clone());
                }
                node.inherits.insert(name.to_string(), target);
            }

            yield_point.tick();
        }
        progress.fraction(phase::COMPOSE_MERGE, done + 1, layers.len());
    }

    let cross_layer_references = foreign_refs
        .iter()
        .filter(|target| nodes.contains_key(target.as_str()))
        .count();
    let mut path_to_layers = FxHashMap::default();
    for node in nodes.values_mut() {
        node.contributing_layers.reverse();
        path_to_layers.insert(node.path.clone(), node.contributing_layers.clone());
    }
    progress.finish(phase::COMPOSE_MERGE);

    progress.start(phase::COMPOSE_INHERIT);
    let inheritance_resolutions = resolve_inheritance(&mut nodes, options.max_inherit_depth);
    progress.finish(phase::COMPOSE_INHERIT);

    let stats = CompositionStats {
        layers_used: layers.len(),
        inheritance_resolutions,
        cross_layer_references,
        node_count: nodes.len(),
    };
    log::debug!(
        "composed {} nodes from {} layers ({} inheritance resolutions, {} cross-layer refs)",
        stats.node_count,
        stats.layers_used,
        stats.inheritance_resolutions,
        stats.cross_layer_references
    );

    Composition {
        nodes,
        stats,
        path_index,
        path_to_layers,
    }
}

type Inherited = (BTreeMap<String, Value>, BTreeMap<String, String>);

/// Fill missing keys from inheritance targets, nearest target first
///
/// Reads only directly composed values, so the result does not depend on
/// the order nodes are visited. Returns the number of targets applied.
fn resolve_inheritance(nodes: &mut BTreeMap<String, ComposedNode>, max_depth: usize) -> usize {
    let mut resolutions = 0;
    let mut additions: Vec<(String, Inherited)> = Vec::new();

    for (path, node) in nodes.iter() {
        if node.inherits.is_empty() {
            continue;
        }

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        visited.insert(path.as_str());
        let mut frontier: Vec<&str> = node.inherits.values().map(String::as_str).collect();
        let mut attributes = BTreeMap::new();
        let mut children = BTreeMap::new();
        let mut depth = 0;

        while !frontier.is_empty() {
            if depth == max_depth {
                log::debug!("inheritance of '{}' stopped after {} hops", path, depth);
                break;
            }
            depth += 1;

            let mut next = Vec::new();
            for target in frontier {
                if !visited.insert(target) {
                    continue;
                }
                let Some(base) = nodes.get(target) else {
                    continue;
                };
                resolutions += 1;

                for (key, value) in &base.attributes {
                    if !node.attributes.contains_key(key) && !attributes.contains_key(key) {
                        attributes.insert(key.clone(), value.clone());
                    }
                }
                for (name, child) in &base.children {
                    if !node.children.contains_key(name) && !children.contains_key(name) {
                        children.insert(name.clone(), child.clone());
                    }
                }
                next.extend(base.inherits.values().map(String::as_str));
            }
            frontier = next;
        }

        if !attributes.is_empty() || !children.is_empty() {
            additions.push((path.clone(), (attributes, children)));
        }
    }

    for (path, (attributes, children)) in additions {
        if let Some(node) = nodes.get_mut(&path) {
            node.attributes.extend(attributes);
            node.children.extend(children);
        }
    }
    resolutions
}
