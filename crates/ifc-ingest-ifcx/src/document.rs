// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFCX document model
//!
//! An IFCX file is a JSON object `{header: {ifcxVersion, ...}, data: [...]}`
//! where each data entry declares something about one path: child names,
//! inheritance targets, and namespaced attributes. A `null` value in any of
//! those maps is accepted and contributes nothing.

use ifc_ingest_model::{ParseError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level IFCX file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IfcxDocument {
    #[serde(default)]
    pub header: Option<IfcxHeader>,
    #[serde(default)]
    pub imports: Vec<IfcxImport>,
    #[serde(default)]
    pub schemas: BTreeMap<String, Value>,
    #[serde(default)]
    pub data: Vec<IfcxNode>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IfcxHeader {
    /// Kept untyped so a non-string version is reported as invalid, not as bad JSON
    #[serde(rename = "ifcxVersion", default)]
    pub ifcx_version: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IfcxImport {
    pub uri: String,
    #[serde(default)]
    pub integrity: Option<String>,
}

/// One declaration about a path
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IfcxNode {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<BTreeMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<BTreeMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, Value>>,
}

impl IfcxNode {
    /// Declared children, skipping null targets
    pub fn children(&self) -> impl Iterator<Item = (&str, &str)> {
        non_null(&self.children)
    }

    /// Declared inheritance targets, skipping null targets
    pub fn inherits(&self) -> impl Iterator<Item = (&str, &str)> {
        non_null(&self.inherits)
    }

    /// Declared attributes, skipping null values
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes
            .iter()
            .flatten()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.as_str(), value))
    }
}

fn non_null(map: &Option<BTreeMap<String, Option<String>>>) -> impl Iterator<Item = (&str, &str)> {
    map.iter()
        .flatten()
        .filter_map(|(name, target)| Some((name.as_str(), target.as_deref()?)))
}

impl IfcxDocument {
    /// Parse and validate one IFCX file
    ///
    /// `file` names the input in error messages.
    pub fn parse(file: &str, bytes: &[u8]) -> Result<Self> {
        let document: IfcxDocument =
            serde_json::from_slice(bytes).map_err(|e| ParseError::ifcx(file, e.to_string()))?;
        if document.version().is_none() {
            return Err(ParseError::MissingIfcxVersion {
                file: file.to_string(),
            });
        }
        Ok(document)
    }

    /// `header.ifcxVersion` when it is a non-empty string
    pub fn version(&self) -> Option<&str> {
        self.header
            .as_ref()?
            .ifcx_version
            .as_ref()?
            .as_str()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Cheap content sniff: the buffer opens a JSON object
///
/// Only the opening brace is checked; [`IfcxDocument::parse`] reports
/// structural errors with the file name.
pub fn looks_like_ifcx(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nodes_and_skips_nulls() {
        let json = br#"{
            "header": {"ifcxVersion": "ifcx_alpha", "author": "ana"},
            "data": [
                {"path": "u1", "children": {"Door": "u2", "Gone": null},
                 "attributes": {"Name": "Wall", "Obsolete": null}},
                {"path": "u2", "inherits": {"type": "u3"}}
            ]
        }"#;
        let doc = IfcxDocument::parse("a.ifcx", json).unwrap();

        assert_eq!(doc.version(), Some("ifcx_alpha"));
        assert_eq!(doc.data.len(), 2);
        assert_eq!(doc.data[0].children().collect::<Vec<_>>(), vec![("Door", "u2")]);
        assert_eq!(doc.data[0].attributes().count(), 1);
        assert_eq!(doc.data[1].inherits().next(), Some(("type", "u3")));
        assert_eq!(doc.data[1].attributes().count(), 0);
    }

    #[test]
    fn test_structural_errors_name_the_file() {
        let err = IfcxDocument::parse("bad.ifcx", b"{not json").unwrap_err();
        assert!(matches!(&err, ParseError::InvalidIfcx { file, .. } if file == "bad.ifcx"));

        for body in [
            &br#"{"data": []}"#[..],
            br#"{"header": {}, "data": []}"#,
            br#"{"header": {"ifcxVersion": 5}, "data": []}"#,
            br#"{"header": {"ifcxVersion": "  "}, "data": []}"#,
        ] {
            let err = IfcxDocument::parse("v.ifcx", body).unwrap_err();
            assert!(matches!(err, ParseError::MissingIfcxVersion { .. }));
        }
    }

    #[test]
    fn test_sniff() {
        assert!(looks_like_ifcx(b"  {\"header\": {\"ifcxVersion\": \"1\"}}"));
        assert!(!looks_like_ifcx(b"ISO-10303-21;"));
        assert!(!looks_like_ifcx(b""));
        assert!(looks_like_ifcx(b"\xEF\xBB\xBF\n{}"));
    }

    #[test]
    fn test_sniff_ignores_key_order() {
        let schemas = format!(r#"{{"doc": "{}"}}"#, "x".repeat(5000));
        let json = format!(
            r#"{{"schemas": {{"ex::doc": {}}}, "header": {{"ifcxVersion": "ifcx_alpha"}}, "data": []}}"#,
            schemas
        );
        assert!(looks_like_ifcx(json.as_bytes()));
        let doc = IfcxDocument::parse("big.ifcx", json.as_bytes()).unwrap();
        assert_eq!(doc.version(), Some("ifcx_alpha"));
        assert_eq!(doc.schemas.len(), 1);
    }
}
