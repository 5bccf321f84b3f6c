// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ingestion configuration loaded from environment variables or serde

use ifc_ingest_ifcx::{IfcxParser, DEFAULT_MAX_INHERIT_DEPTH};
use ifc_ingest_step::{StepParser, DEFAULT_EAGER_PROPERTY_THRESHOLD, DEFAULT_YIELD_INTERVAL};
use serde::{Deserialize, Serialize};

/// Settings shared by both ingestion paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Derive the spatial hierarchy.
    pub build_spatial_tree: bool,
    /// STEP record count up to which property sets are decoded eagerly.
    pub eager_property_threshold: usize,
    /// Items processed between two yield hook calls.
    pub yield_interval: usize,
    /// Maximum `inherits` hops followed per IFCX node.
    pub max_inherit_depth: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            build_spatial_tree: true,
            eager_property_threshold: DEFAULT_EAGER_PROPERTY_THRESHOLD,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            max_inherit_depth: DEFAULT_MAX_INHERIT_DEPTH,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            build_spatial_tree: lookup("IFC_INGEST_SPATIAL")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.build_spatial_tree),
            eager_property_threshold: number(
                "IFC_INGEST_EAGER_PROPERTY_THRESHOLD",
                defaults.eager_property_threshold,
            ),
            yield_interval: number("IFC_INGEST_YIELD_INTERVAL", defaults.yield_interval),
            max_inherit_depth: number("IFC_INGEST_MAX_INHERIT_DEPTH", defaults.max_inherit_depth),
        }
    }

    pub fn step_parser(&self) -> StepParser {
        StepParser::new()
            .with_spatial_tree(self.build_spatial_tree)
            .with_eager_property_threshold(self.eager_property_threshold)
            .with_yield_interval(self.yield_interval)
    }

    pub fn ifcx_parser(&self) -> IfcxParser {
        IfcxParser::new()
            .with_spatial_tree(self.build_spatial_tree)
            .with_max_inherit_depth(self.max_inherit_depth)
            .with_yield_interval(self.yield_interval)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
