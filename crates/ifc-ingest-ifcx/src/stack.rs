// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered layer stack
//!
//! Position 0 is the strongest layer. After every mutation each layer's
//! `strength` equals its index. Composition never reads the stack
//! directly: it takes a [`LayerSnapshot`] of the enabled layers, and
//! later mutations copy the affected layer instead of changing the one a
//! snapshot holds.

use crate::layer::IfcxLayer;
use ifc_ingest_model::{ParseError, Result};
use rustc_hash::FxHashSet;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct LayerStack {
    layers: Vec<Arc<IfcxLayer>>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// All layers strongest-first, disabled ones included
    pub fn layers(&self) -> &[Arc<IfcxLayer>] {
        &self.layers
    }

    pub fn get(&self, id: &str) -> Option<&Arc<IfcxLayer>> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == id)
    }

    /// Insert as the new strongest layer; returns its id
    pub fn add_layer(&mut self, layer: IfcxLayer) -> String {
        self.add_layer_at(layer, 0)
    }

    /// Insert at `position`, clamped to the end of the stack
    pub fn add_layer_at(&mut self, layer: IfcxLayer, position: usize) -> String {
        let id = layer.id.clone();
        let position = position.min(self.layers.len());
        self.layers.insert(position, Arc::new(layer));
        self.renumber();
        id
    }

    pub fn remove_layer(&mut self, id: &str) -> Result<Arc<IfcxLayer>> {
        let position = self.require(id)?;
        let removed = self.layers.remove(position);
        self.renumber();
        Ok(removed)
    }

    /// Move a layer to `to`, clamped to the last position
    pub fn move_layer(&mut self, id: &str, to: usize) -> Result<()> {
        let from = self.require(id)?;
        let layer = self.layers.remove(from);
        let to = to.min(self.layers.len());
        self.layers.insert(to, layer);
        self.renumber();
        Ok(())
    }

    /// Reorder to `ids`, strongest first
    ///
    /// `ids` must name every layer exactly once; otherwise the stack is left
    /// unchanged.
    pub fn reorder_layers<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<()> {
        if ids.len() != self.layers.len() {
            return Err(ParseError::InvalidLayerOrder(format!(
                "expected {} layer ids, got {}",
                self.layers.len(),
                ids.len()
            )));
        }

        let mut seen = FxHashSet::default();
        let mut reordered = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                return Err(ParseError::InvalidLayerOrder(format!("'{}' listed twice", id)));
            }
            let layer = self
                .get(id)
                .ok_or_else(|| ParseError::InvalidLayerOrder(format!("unknown layer '{}'", id)))?;
            reordered.push(Arc::clone(layer));
        }

        self.layers = reordered;
        self.renumber();
        Ok(())
    }

    pub fn set_layer_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let position = self.require(id)?;
        if self.layers[position].enabled != enabled {
            Arc::make_mut(&mut self.layers[position]).enabled = enabled;
        }
        Ok(())
    }

    /// Flip a layer's enabled flag; returns the new value
    pub fn toggle_layer(&mut self, id: &str) -> Result<bool> {
        let position = self.require(id)?;
        let layer = Arc::make_mut(&mut self.layers[position]);
        layer.enabled = !layer.enabled;
        Ok(layer.enabled)
    }

    /// Enabled layers, strongest first
    pub fn enabled_layers(&self) -> Vec<Arc<IfcxLayer>> {
        self.layers
            .iter()
            .filter(|layer| layer.enabled)
            .cloned()
            .collect()
    }

    /// Freeze the enabled layers for one composition pass
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            layers: self.enabled_layers().into(),
        }
    }

    fn require(&self, id: &str) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| ParseError::LayerNotFound(id.to_string()))
    }

    fn renumber(&mut self) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            if layer.strength != i {
                Arc::make_mut(layer).strength = i;
            }
        }
    }
}

/// Immutable view of the enabled layers at one point in time
#[derive(Clone, Debug, Default)]
pub struct LayerSnapshot {
    layers: Arc<[Arc<IfcxLayer>]>,
}

impl LayerSnapshot {
    /// Enabled layers, strongest first
    pub fn enabled_layers(&self) -> &[Arc<IfcxLayer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.id.as_str()).collect()
    }
}
