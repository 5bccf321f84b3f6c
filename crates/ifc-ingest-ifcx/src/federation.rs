// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Federated IFCX models
//!
//! A [`FederatedModel`] owns the layer stack and everything derived from
//! it. Every change to the stack (new overlay, toggled or removed layer)
//! re-runs composition and extraction over the full current stack; nothing
//! is patched incrementally.

use crate::composer::{compose, ComposeOptions, ComposedNode, Composition, CompositionStats};
use crate::layer::{IfcxLayer, LayerSource};
use crate::path_index::PathIndex;
use crate::pipeline::{extract, ExtractOptions, Extraction};
use crate::stack::{LayerSnapshot, LayerStack};
use ifc_ingest_model::{
    EntityId, IfcDataStore, ModelMetadata, ParseError, ProgressCallback, ProgressReporter,
    Result, YieldHook, YieldPoint,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;

/// Items processed between two yield hook calls
pub const DEFAULT_YIELD_INTERVAL: usize = 5_000;

/// Name given to a buffer parsed without one
const DEFAULT_FILE_NAME: &str = "model.ifcx";

/// IFCX parser configuration
#[derive(Clone)]
pub struct IfcxParser {
    pub compose: ComposeOptions,
    /// Whether to derive the spatial hierarchy
    pub build_spatial_tree: bool,
    pub yield_interval: usize,
    pub yield_hook: Option<YieldHook>,
}

impl Default for IfcxParser {
    fn default() -> Self {
        Self {
            compose: ComposeOptions::default(),
            build_spatial_tree: true,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            yield_hook: None,
        }
    }
}

impl IfcxParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compose_options(mut self, compose: ComposeOptions) -> Self {
        self.compose = compose;
        self
    }

    pub fn with_max_inherit_depth(mut self, depth: usize) -> Self {
        self.compose.max_inherit_depth = depth;
        self
    }

    pub fn with_spatial_tree(mut self, enabled: bool) -> Self {
        self.build_spatial_tree = enabled;
        self
    }

    pub fn with_yield_interval(mut self, interval: usize) -> Self {
        self.yield_interval = interval;
        self
    }

    pub fn with_yield_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.yield_hook = Some(Arc::new(hook));
        self
    }

    /// Parse a single IFCX file
    pub fn parse(&self, content: &[u8]) -> Result<IfcDataStore> {
        self.parse_federated(&[(DEFAULT_FILE_NAME, content)])
            .map(|model| model.store)
    }

    pub fn parse_with_progress(
        &self,
        content: &[u8],
        on_progress: ProgressCallback,
    ) -> Result<IfcDataStore> {
        self.parse_federated_with_progress(&[(DEFAULT_FILE_NAME, content)], on_progress)
            .map(|model| model.store)
    }

    /// Parse several IFCX files as one layer stack
    ///
    /// Files are given base first: the last file is the strongest layer.
    pub fn parse_federated(&self, files: &[(&str, &[u8])]) -> Result<FederatedModel> {
        self.federate(files, &ProgressReporter::silent())
    }

    pub fn parse_federated_with_progress(
        &self,
        files: &[(&str, &[u8])],
        on_progress: ProgressCallback,
    ) -> Result<FederatedModel> {
        self.federate(files, &ProgressReporter::new(Some(on_progress.as_ref())))
    }

    fn federate(
        &self,
        files: &[(&str, &[u8])],
        progress: &ProgressReporter<'_>,
    ) -> Result<FederatedModel> {
        let started = Instant::now();
        if files.is_empty() {
            return Err(ParseError::other("no IFCX files to compose"));
        }

        let mut layer_stack = LayerStack::new();
        for (name, bytes) in files {
            let layer = IfcxLayer::from_bytes(*name, Arc::from(*bytes), LayerSource::Base)?;
            layer_stack.add_layer(layer);
        }

        let (composition, extraction) = derive(&layer_stack, self, progress, started);
        Ok(FederatedModel {
            store: extraction.store,
            layer_stack,
            composition,
            path_to_express_id: extraction.path_to_express_id,
            express_id_to_path: extraction.express_id_to_path,
            parser: self.clone(),
        })
    }
}

impl std::fmt::Debug for IfcxParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IfcxParser")
            .field("compose", &self.compose)
            .field("build_spatial_tree", &self.build_spatial_tree)
            .field("yield_interval", &self.yield_interval)
            .field("yield_hook", &self.yield_hook.is_some())
            .finish()
    }
}

/// Compose the stack and extract the store
fn derive(
    stack: &LayerStack,
    parser: &IfcxParser,
    progress: &ProgressReporter<'_>,
    started: Instant,
) -> (Composition, Extraction) {
    let snapshot = stack.snapshot();
    let mut yield_point = YieldPoint::new(parser.yield_interval, parser.yield_hook.clone());

    let composition = compose(&snapshot, &parser.compose, progress, &mut yield_point);
    let extraction = extract(
        &composition,
        metadata(&snapshot),
        ExtractOptions {
            build_spatial_tree: parser.build_spatial_tree,
        },
        progress,
        &mut yield_point,
        started,
    );
    (composition, extraction)
}

/// Header of the strongest enabled layer
fn metadata(snapshot: &LayerSnapshot) -> ModelMetadata {
    let Some(layer) = snapshot.enabled_layers().first() else {
        return ModelMetadata::default();
    };
    let header = layer.raw_file.header.clone().unwrap_or_default();
    ModelMetadata {
        schema_version: layer.version().unwrap_or_default().to_string(),
        file_name: Some(layer.name.clone()),
        file_description: header.id,
        author: header.author,
        timestamp: header.timestamp,
        ..Default::default()
    }
}

/// Layer stack plus everything derived from its enabled layers
pub struct FederatedModel {
    pub store: IfcDataStore,
    layer_stack: LayerStack,
    pub composition: Composition,
    pub path_to_express_id: FxHashMap<String, u32>,
    pub express_id_to_path: FxHashMap<u32, String>,
    parser: IfcxParser,
}

impl FederatedModel {
    /// Layers strongest first; change them through the methods below
    pub fn layer_stack(&self) -> &LayerStack {
        &self.layer_stack
    }

    pub fn path_index(&self) -> &PathIndex {
        &self.composition.path_index
    }

    pub fn composition_stats(&self) -> CompositionStats {
        self.composition.stats
    }

    /// Canonical path → contributing layer ids, strongest first
    pub fn path_to_layers(&self) -> &FxHashMap<String, Vec<String>> {
        &self.composition.path_to_layers
    }

    /// Express id of the entity at a UUID or hierarchical path
    pub fn express_id_of(&self, path: &str) -> Option<EntityId> {
        let canonical = self.path_index().resolve_path(path).unwrap_or(path);
        self.path_to_express_id.get(canonical).copied().map(EntityId)
    }

    /// Canonical path of an entity
    pub fn path_of(&self, id: EntityId) -> Option<&str> {
        self.express_id_to_path.get(&id.0).map(String::as_str)
    }

    pub fn node(&self, path: &str) -> Option<&ComposedNode> {
        self.composition.get(path)
    }

    /// Push a new strongest layer and re-derive; returns the layer id
    pub fn add_ifcx_overlay(&mut self, name: &str, content: &[u8]) -> Result<String> {
        let layer = IfcxLayer::from_bytes(name, Arc::from(content), LayerSource::Overlay)?;
        let id = self.layer_stack.add_layer(layer);
        log::debug!("overlay '{}' added as layer {}", name, id);
        self.recompose();
        Ok(id)
    }

    pub fn set_layer_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        self.layer_stack.set_layer_enabled(id, enabled)?;
        self.recompose();
        Ok(())
    }

    pub fn remove_layer(&mut self, id: &str) -> Result<()> {
        self.layer_stack.remove_layer(id)?;
        self.recompose();
        Ok(())
    }

    /// Move a layer to `to`, clamped to the weakest position
    pub fn move_layer(&mut self, id: &str, to: usize) -> Result<()> {
        self.layer_stack.move_layer(id, to)?;
        self.recompose();
        Ok(())
    }

    /// Reorder to `ids`, strongest first
    pub fn reorder_layers<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<()> {
        self.layer_stack.reorder_layers(ids)?;
        self.recompose();
        Ok(())
    }

    /// Re-run composition and extraction over the current stack
    pub fn recompose(&mut self) {
        self.recompose_with(&ProgressReporter::silent());
    }

    pub fn recompose_with_progress(&mut self, on_progress: &(dyn Fn(&str, f32) + Send)) {
        self.recompose_with(&ProgressReporter::new(Some(on_progress)));
    }

    fn recompose_with(&mut self, progress: &ProgressReporter<'_>) {
        let (composition, extraction) =
            derive(&self.layer_stack, &self.parser, progress, Instant::now());
        self.composition = composition;
        self.store = extraction.store;
        self.path_to_express_id = extraction.path_to_express_id;
        self.express_id_to_path = extraction.express_id_to_path;
    }
}

impl std::fmt::Debug for FederatedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedModel")
            .field("layers", &self.layer_stack.len())
            .field("stats", &self.composition.stats)
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"{
        "header": {"ifcxVersion": "ifcx_alpha", "author": "base team"},
        "data": [
            {"path": "proj", "children": {"Site": "site"},
             "attributes": {"bsi::ifc::class": {"code": "IfcProject"}}},
            {"path": "site", "children": {"Storey": "st"},
             "attributes": {"bsi::ifc::class": {"code": "IfcSite"}}},
            {"path": "st", "children": {"Wall": "wall"},
             "attributes": {"bsi::ifc::class": {"code": "IfcBuildingStorey"}}},
            {"path": "wall", "attributes": {"bsi::ifc::class": {"code": "IfcWall"},
                                            "bsi::ifc::prop::Name": "Base Wall"}}
        ]
    }"#;

    const OVERLAY: &str = r#"{
        "header": {"ifcxVersion": "ifcx_alpha"},
        "data": [
            {"path": "wall", "attributes": {"bsi::ifc::prop::FireRating": "2HR"}},
            {"path": "st", "children": {"Door": "door"}},
            {"path": "door", "attributes": {"bsi::ifc::class": {"code": "IfcDoor"}}}
        ]
    }"#;

    fn fire_rating(model: &FederatedModel) -> Option<String> {
        let wall = model.express_id_of("wall")?;
        model
            .store
            .property_sets(wall)
            .iter()
            .find_map(|set| set.get("FireRating"))
            .map(|p| p.value.to_string())
    }

    #[test]
    fn test_single_file_parse() {
        let store = IfcxParser::new().parse(BASE.as_bytes()).unwrap();
        assert_eq!(store.entity_count, 4);
        assert_eq!(store.schema_version, "ifcx_alpha");
        assert_eq!(store.metadata.author.as_deref(), Some("base team"));
        assert!(store.spatial_hierarchy.is_some());
    }

    #[test]
    fn test_last_file_is_strongest() {
        let model = IfcxParser::new()
            .parse_federated(&[("base.ifcx", BASE.as_bytes()), ("fire.ifcx", OVERLAY.as_bytes())])
            .unwrap();

        assert_eq!(model.layer_stack().layers()[0].name, "fire.ifcx");
        assert_eq!(model.store.entity_count, 5);
        assert_eq!(fire_rating(&model).as_deref(), Some("2HR"));
        assert_eq!(model.composition_stats().layers_used, 2);
        assert_eq!(model.path_to_layers()["wall"].len(), 2);
        assert_eq!(model.path_index().resolve_path("proj/Site/Storey/Door"), Some("door"));
    }

    #[test]
    fn test_overlay_lifecycle_rederives() {
        let mut model = IfcxParser::new()
            .parse_federated(&[("base.ifcx", BASE.as_bytes())])
            .unwrap();
        assert_eq!(fire_rating(&model), None);

        let overlay = model.add_ifcx_overlay("fire.ifcx", OVERLAY.as_bytes()).unwrap();
        assert_eq!(fire_rating(&model).as_deref(), Some("2HR"));
        let door = model.express_id_of("proj/Site/Storey/Door").unwrap();
        assert_eq!(model.path_of(door), Some("door"));

        model.set_layer_enabled(&overlay, false).unwrap();
        assert_eq!(fire_rating(&model), None);
        assert!(model.express_id_of("door").is_none());
        assert_eq!(model.layer_stack().len(), 2);
        assert_eq!(model.layer_stack().get(&overlay).map(|l| l.enabled), Some(false));

        model.set_layer_enabled(&overlay, true).unwrap();
        assert_eq!(fire_rating(&model).as_deref(), Some("2HR"));

        model.move_layer(&overlay, 1).unwrap();
        assert_eq!(model.layer_stack().position(&overlay), Some(1));
        assert_eq!(model.path_to_layers()["wall"].last(), Some(&overlay));

        model.remove_layer(&overlay).unwrap();
        assert_eq!(model.layer_stack().len(), 1);
        assert_eq!(model.store.entity_count, 4);
        assert!(matches!(
            model.remove_layer(&overlay),
            Err(ParseError::LayerNotFound(_))
        ));
    }

    #[test]
    fn test_bad_overlay_leaves_model_untouched() {
        let mut model = IfcxParser::new()
            .parse_federated(&[("base.ifcx", BASE.as_bytes())])
            .unwrap();
        let err = model.add_ifcx_overlay("broken.ifcx", b"{\"data\": []}").unwrap_err();
        assert!(matches!(err, ParseError::MissingIfcxVersion { ref file } if file == "broken.ifcx"));
        assert_eq!(model.layer_stack().len(), 1);
        assert_eq!(model.store.entity_count, 4);
    }

    #[test]
    fn test_all_layers_disabled_yields_empty_store() {
        let mut model = IfcxParser::new()
            .parse_federated(&[("base.ifcx", BASE.as_bytes())])
            .unwrap();
        let id = model.layer_stack().layers()[0].id.clone();
        model.set_layer_enabled(&id, false).unwrap();

        assert_eq!(model.store.entity_count, 0);
        assert!(model.store.spatial_hierarchy.is_none());
        assert!(model.composition.is_empty());
    }

    #[test]
    fn test_no_files_is_an_error() {
        assert!(IfcxParser::new().parse_federated(&[]).is_err());
    }
}
