// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One IFCX file placed in a layer stack

use crate::document::{IfcxDocument, IfcxNode};
use ifc_ingest_model::Result;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Where a layer came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerSource {
    /// Part of the initial file set
    Base,
    /// Added later through an overlay call
    Overlay,
}

/// A parsed IFCX file plus its position in the stack
///
/// Cloning is cheap: the buffer, document and node map are shared. The
/// stack relies on this to copy a layer on write while snapshots keep the
/// previous version.
#[derive(Clone, Debug)]
pub struct IfcxLayer {
    pub id: String,
    pub name: String,
    pub raw_file: Arc<IfcxDocument>,
    pub buffer: Arc<[u8]>,
    /// Stack position, 0 is strongest
    pub strength: usize,
    pub enabled: bool,
    pub source: LayerSource,
    /// Declared path → indexes into `raw_file.data`, in file order
    pub nodes_by_path: Arc<FxHashMap<String, Vec<usize>>>,
    pub loaded_at: SystemTime,
}

impl IfcxLayer {
    /// Parse a buffer into a new enabled layer with a fresh id
    pub fn from_bytes(
        name: impl Into<String>,
        buffer: Arc<[u8]>,
        source: LayerSource,
    ) -> Result<Self> {
        let name = name.into();
        let document = IfcxDocument::parse(&name, &buffer)?;

        let mut nodes_by_path: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, node) in document.data.iter().enumerate() {
            nodes_by_path.entry(node.path.clone()).or_default().push(i);
        }
        log::debug!(
            "layer '{}': {} declarations over {} paths",
            name,
            document.data.len(),
            nodes_by_path.len()
        );

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            raw_file: Arc::new(document),
            buffer,
            strength: 0,
            enabled: true,
            source,
            nodes_by_path: Arc::new(nodes_by_path),
            loaded_at: SystemTime::now(),
        })
    }

    pub fn version(&self) -> Option<&str> {
        self.raw_file.version()
    }

    /// Every declaration in file order
    pub fn nodes(&self) -> &[IfcxNode] {
        &self.raw_file.data
    }

    /// Declarations of one path, in file order
    pub fn declarations<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a IfcxNode> + 'a {
        let data = &self.raw_file.data;
        self.nodes_by_path
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(move |&i| data.get(i))
    }

    pub fn declares(&self, path: &str) -> bool {
        self.nodes_by_path.contains_key(path)
    }

    pub fn path_count(&self) -> usize {
        self.nodes_by_path.len()
    }
}
