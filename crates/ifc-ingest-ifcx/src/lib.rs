// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC Ingest IFCX - Layered JSON composition
//!
//! An IFCX file is a JSON document whose `data` array declares nodes by
//! path. Several files form a stack of layers: a node's final value is the
//! merge of every enabled layer's declarations for it, the stronger layer
//! winning on conflicting attribute keys.
//!
//! # Pipeline
//!
//! 1. [`IfcxLayer::from_bytes`] parses and indexes one file
//! 2. [`LayerStack`] orders layers, strongest at position 0
//! 3. [`compose`] merges a [`LayerSnapshot`] into [`ComposedNode`]s and
//!    resolves `inherits` references
//! 4. [`extract`] maps classed nodes onto the shared [`IfcDataStore`]
//!
//! [`FederatedModel`] ties these together and re-derives everything when
//! layers are added, toggled or removed.
//!
//! # Example
//!
//! ```ignore
//! use ifc_ingest_ifcx::IfcxParser;
//!
//! let mut model = IfcxParser::new()
//!     .parse_federated(&[("base.ifcx", base), ("fire.ifcx", fire)])?;
//! let overlay = model.add_ifcx_overlay("review.ifcx", review)?;
//! model.set_layer_enabled(&overlay, false)?;
//! ```
//!
//! [`IfcDataStore`]: ifc_ingest_model::IfcDataStore

pub mod composer;
pub mod document;
pub mod federation;
pub mod layer;
pub mod path_index;
pub mod pipeline;
pub mod stack;

pub use composer::{
    compose, ComposeOptions, ComposedNode, Composition, CompositionStats,
    DEFAULT_MAX_INHERIT_DEPTH,
};
pub use document::{looks_like_ifcx, IfcxDocument, IfcxHeader, IfcxImport, IfcxNode};
pub use federation::{FederatedModel, IfcxParser, DEFAULT_YIELD_INTERVAL};
pub use layer::{IfcxLayer, LayerSource};
pub use path_index::{PathEntry, PathIndex};
pub use pipeline::{class_code, extract, to_property_value, ExtractOptions, Extraction};
pub use stack::{LayerSnapshot, LayerStack};

use ifc_ingest_model::{IfcDataStore, ProgressCallback, Result};

/// Parse a single IFCX file with default settings
pub fn parse(content: &[u8]) -> Result<IfcDataStore> {
    IfcxParser::new().parse(content)
}

/// Parse a single IFCX file, reporting progress per phase
pub fn parse_with_progress(content: &[u8], on_progress: ProgressCallback) -> Result<IfcDataStore> {
    IfcxParser::new().parse_with_progress(content, on_progress)
}

/// Compose several IFCX files, given base first
pub fn parse_federated(files: &[(&str, &[u8])]) -> Result<FederatedModel> {
    IfcxParser::new().parse_federated(files)
}
