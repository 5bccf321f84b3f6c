// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Targeted attribute extraction for a single record

use crate::index::EntityRef;
use crate::tokenizer::parse_entity;
use ifc_ingest_model::{DecodedEntity, EntityId, ParseError, Result};

/// Parses the attribute list of one record on demand
///
/// Only the record's own byte range is tokenized. Extraction is pure: the
/// buffer is never modified and repeated calls yield equal results.
#[derive(Clone, Copy)]
pub struct AttributeExtractor<'a> {
    content: &'a [u8],
}

impl<'a> AttributeExtractor<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        Self { content }
    }

    pub fn extract(&self, entity_ref: &EntityRef) -> Result<DecodedEntity> {
        let id = EntityId(entity_ref.express_id);
        let bytes = self
            .content
            .get(entity_ref.range())
            .ok_or_else(|| ParseError::entity_parse(id, "record lies outside the buffer"))?;

        let text = String::from_utf8_lossy(bytes);
        let entity = parse_entity(&text).map_err(|e| {
            ParseError::entity_parse(id, format!("line {}: {}", entity_ref.line_number, e))
        })?;

        if entity.id != id {
            return Err(ParseError::entity_parse(
                id,
                format!("record at offset {} is {}", entity_ref.byte_offset, entity.id),
            ));
        }
        Ok(entity)
    }

    /// Raw record text, for diagnostics
    pub fn raw(&self, entity_ref: &EntityRef) -> Option<&'a [u8]> {
        self.content.get(entity_ref.range())
    }
}
