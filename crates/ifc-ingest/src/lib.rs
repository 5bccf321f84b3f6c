// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC Ingest - one entry point for STEP and IFCX models
//!
//! The wire format is detected from content, so callers hand over a buffer
//! and get back the columnar [`IfcDataStore`]:
//!
//! ```ignore
//! let store = ifc_ingest::parse(&bytes)?;
//! println!("{} entities ({:?})", store.entity_count, store.format);
//! ```
//!
//! Several IFCX files compose into a [`FederatedModel`] whose layers can be
//! added, toggled or removed afterwards:
//!
//! ```ignore
//! let mut model = ifc_ingest::parse_federated(&[("base.ifcx", &base)])?;
//! let overlay = model.add_ifcx_overlay("fire.ifcx", &fire)?;
//! model.set_layer_enabled(&overlay, false)?;
//! ```

mod config;

pub use config::IngestConfig;
pub use ifc_ingest_ifcx::{FederatedModel, IfcxParser};
pub use ifc_ingest_model::{FileFormat, IfcDataStore, ParseError, ProgressCallback, Result};
pub use ifc_ingest_step::StepParser;

pub use ifc_ingest_ifcx as ifcx;
pub use ifc_ingest_model as model;
pub use ifc_ingest_step as step;

/// Sniff the wire format of a buffer
pub fn detect_format(content: &[u8]) -> Option<FileFormat> {
    if ifc_ingest_step::looks_like_step(content) {
        Some(FileFormat::Step)
    } else if ifc_ingest_ifcx::looks_like_ifcx(content) {
        Some(FileFormat::Ifcx)
    } else {
        None
    }
}

fn require_format(content: &[u8]) -> Result<FileFormat> {
    detect_format(content).ok_or_else(|| {
        ParseError::UnsupportedFormat("expected an ISO-10303-21 or IFCX JSON buffer".into())
    })
}

/// Parse a STEP or IFCX buffer with default settings
pub fn parse(content: &[u8]) -> Result<IfcDataStore> {
    parse_with_config(content, &IngestConfig::default())
}

pub fn parse_with_config(content: &[u8], config: &IngestConfig) -> Result<IfcDataStore> {
    let format = require_format(content)?;
    log::debug!("ingesting {} byte {:?} buffer", content.len(), format);
    match format {
        FileFormat::Step => config.step_parser().parse(content),
        FileFormat::Ifcx => config.ifcx_parser().parse(content),
    }
}

/// Parse with a `(phase, percent)` callback
pub fn parse_with_progress(content: &[u8], on_progress: ProgressCallback) -> Result<IfcDataStore> {
    match require_format(content)? {
        FileFormat::Step => StepParser::new().parse_with_progress(content, on_progress),
        FileFormat::Ifcx => IfcxParser::new().parse_with_progress(content, on_progress),
    }
}

/// Compose IFCX files given base first; the last file is the strongest layer
pub fn parse_federated(files: &[(&str, &[u8])]) -> Result<FederatedModel> {
    parse_federated_with_config(files, &IngestConfig::default())
}

pub fn parse_federated_with_config(
    files: &[(&str, &[u8])],
    config: &IngestConfig,
) -> Result<FederatedModel> {
    config.ifcx_parser().parse_federated(files)
}
