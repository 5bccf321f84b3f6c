// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC STEP ingestion
//!
//! Turns an ISO-10303-21 buffer into the columnar [`IfcDataStore`] while
//! parsing as little as possible.
//!
//! # Features
//!
//! - **Single-pass scanning** using `memchr` to index every record
//! - **Targeted extraction** using `nom` to tokenize one record at a time
//! - **Lazy entity store** caching each parsed record behind an `Arc`
//! - **On-demand properties** for files above the eager threshold
//! - **Progress reporting** and cooperative yield points for large files
//!
//! # Example
//!
//! ```ignore
//! use ifc_ingest_step::StepParser;
//!
//! let store = StepParser::new().parse(&bytes)?;
//! for &wall in store.entities.ids_by_type("IFCWALL") {
//!     println!("{:?}", store.entities.get_name(wall));
//! }
//! ```

mod columnar;
mod extractor;
mod index;
mod properties;
mod relationships;
mod scanner;
mod store;
mod tokenizer;
mod units;

pub use extractor::AttributeExtractor;
pub use index::{EntityIndex, EntityRef};
pub use properties::{
    elements_defined_by, materialize, to_property_value, DefinitionMaps, OnDemandProperties,
    SetDecoder,
};
pub use relationships::{extract_relationships, layout, RelationshipLayout, MAPPED_TYPES};
pub use scanner::{looks_like_step, parse_header, EntityScanner, ScannedRecord};
pub use store::{EntityState, EntityStore};
pub use tokenizer::{decode_step_string, parse_entity, SyntaxError, Token};
pub use units::length_unit_scale;

use ifc_ingest_model::{IfcDataStore, ProgressCallback, ProgressReporter, Result, YieldHook};
use std::sync::Arc;

/// Files with at most this many records get materialized property tables
pub const DEFAULT_EAGER_PROPERTY_THRESHOLD: usize = 50_000;

/// Items processed between two yield hook calls
pub const DEFAULT_YIELD_INTERVAL: usize = 5_000;

/// STEP parser configuration
#[derive(Clone)]
pub struct StepParser {
    /// Whether to derive the spatial hierarchy
    pub build_spatial_tree: bool,
    /// Record count up to which property sets are decoded during parsing
    pub eager_property_threshold: usize,
    /// Items between two yield hook calls
    pub yield_interval: usize,
    pub yield_hook: Option<YieldHook>,
}

impl Default for StepParser {
    fn default() -> Self {
        Self {
            build_spatial_tree: true,
            eager_property_threshold: DEFAULT_EAGER_PROPERTY_THRESHOLD,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            yield_hook: None,
        }
    }
}

impl StepParser {
    /// Create a new parser with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to build spatial tree
    pub fn with_spatial_tree(mut self, enabled: bool) -> Self {
        self.build_spatial_tree = enabled;
        self
    }

    /// Decode property sets eagerly up to this many records
    pub fn with_eager_property_threshold(mut self, records: usize) -> Self {
        self.eager_property_threshold = records;
        self
    }

    pub fn with_yield_interval(mut self, interval: usize) -> Self {
        self.yield_interval = interval;
        self
    }

    /// Hook called with the running item count every `yield_interval` items
    pub fn with_yield_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.yield_hook = Some(Arc::new(hook));
        self
    }

    /// Parse a buffer, copying it into shared storage
    pub fn parse(&self, content: &[u8]) -> Result<IfcDataStore> {
        self.parse_shared(Arc::from(content))
    }

    /// Parse a buffer the caller already shares
    pub fn parse_shared(&self, content: Arc<[u8]>) -> Result<IfcDataStore> {
        columnar::ingest(content, self, &ProgressReporter::silent())
    }

    pub fn parse_with_progress(
        &self,
        content: &[u8],
        on_progress: ProgressCallback,
    ) -> Result<IfcDataStore> {
        let reporter = ProgressReporter::new(Some(on_progress.as_ref()));
        columnar::ingest(Arc::from(content), self, &reporter)
    }
}

impl std::fmt::Debug for StepParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepParser")
            .field("build_spatial_tree", &self.build_spatial_tree)
            .field("eager_property_threshold", &self.eager_property_threshold)
            .field("yield_interval", &self.yield_interval)
            .field("yield_hook", &self.yield_hook.is_some())
            .finish()
    }
}

/// Quick parse function for simple use cases
pub fn parse(content: &[u8]) -> Result<IfcDataStore> {
    StepParser::new().parse(content)
}

/// Parse with progress reporting
pub fn parse_with_progress(
    content: &[u8],
    on_progress: impl Fn(&str, f32) + Send + 'static,
) -> Result<IfcDataStore> {
    StepParser::new().parse_with_progress(content, Box::new(on_progress))
}
