// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for ingestion operations
//!
//! Only structurally invalid top-level input is reported through
//! [`ParseError`]. Lookups that miss return `None` or empty collections, and
//! optional features such as the spatial hierarchy report [`HierarchyError`]
//! to the pipeline, which logs it and carries on.

use crate::EntityId;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors that abort an ingestion call
#[derive(Error, Debug)]
pub enum ParseError {
    /// Invalid STEP file format
    #[error("Invalid IFC format: {0}")]
    InvalidFormat(String),

    /// Failed to parse header section
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Buffer is neither STEP nor IFCX
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Failed to parse entity
    #[error("Failed to parse entity {0}: {1}")]
    EntityParse(EntityId, String),

    /// Entity not found
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    /// IFCX file is not valid JSON or does not match the document shape
    #[error("Invalid IFCX file '{file}': {message}")]
    InvalidIfcx { file: String, message: String },

    /// IFCX header lacks a usable `ifcxVersion`
    #[error("Invalid IFCX file '{file}': missing or invalid header.ifcxVersion")]
    MissingIfcxVersion { file: String },

    /// Layer id is not part of the stack
    #[error("Layer '{0}' not found")]
    LayerNotFound(String),

    /// Reorder request is not a permutation of the current stack
    #[error("Invalid layer order: {0}")]
    InvalidLayerOrder(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl ParseError {
    /// Create a new format error
    pub fn format(msg: impl Into<String>) -> Self {
        ParseError::InvalidFormat(msg.into())
    }

    /// Create a new entity parse error
    pub fn entity_parse(id: EntityId, msg: impl Into<String>) -> Self {
        ParseError::EntityParse(id, msg.into())
    }

    /// Create an IFCX document error tagged with the file it came from
    pub fn ifcx(file: impl Into<String>, msg: impl Into<String>) -> Self {
        ParseError::InvalidIfcx {
            file: file.into(),
            message: msg.into(),
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        ParseError::Other(msg.into())
    }
}

/// Reasons the spatial hierarchy could not be derived
///
/// These never abort ingestion; the data store is returned without a
/// hierarchy instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// No IFCPROJECT entity in the model
    #[error("no project entity found")]
    MissingProject,

    /// Aggregation edges loop back onto an ancestor
    #[error("cyclic aggregation at {0}")]
    CyclicAggregation(EntityId),

    /// The root candidate is not a spatial container
    #[error("{0} is not a spatial structure element")]
    NotSpatial(EntityId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ifcx_error_names_file() {
        let err = ParseError::ifcx("overlay.ifcx", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "Invalid IFCX file 'overlay.ifcx': expected value at line 1"
        );

        let err = ParseError::MissingIfcxVersion {
            file: "base.ifcx".into(),
        };
        assert!(err.to_string().contains("base.ifcx"));
    }

    #[test]
    fn test_hierarchy_error_display() {
        assert_eq!(
            HierarchyError::CyclicAggregation(EntityId(7)).to_string(),
            "cyclic aggregation at #7"
        );
    }
}
