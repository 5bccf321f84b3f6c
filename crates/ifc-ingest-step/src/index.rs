// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Id and type index over scanned records

use crate::scanner::{EntityScanner, ScannedRecord};
use ifc_ingest_model::{StringId, StringTable, YieldPoint};
use rustc_hash::FxHashMap;

/// Byte location of one record, with its interned type name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityRef {
    pub express_id: u32,
    /// Upper-case type name
    pub type_name: StringId,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub line_number: u32,
}

impl EntityRef {
    /// Byte range of the record within the buffer
    pub fn range(&self) -> std::ops::Range<usize> {
        self.byte_offset..self.byte_offset + self.byte_length
    }
}

/// Records in file order, addressable by id and by type
///
/// Every id listed under a type is present in the id map. When the same id
/// appears twice, the first record is kept.
#[derive(Debug, Default)]
pub struct EntityIndex {
    refs: Vec<EntityRef>,
    by_id: FxHashMap<u32, u32>,
    by_type: FxHashMap<StringId, Vec<u32>>,
}

impl EntityIndex {
    /// Scan `bytes` and index every record
    pub fn build(bytes: &[u8], strings: &StringTable, yield_point: &mut YieldPoint) -> Self {
        let mut index = Self {
            refs: Vec::with_capacity(bytes.len() / 80),
            ..Default::default()
        };

        for record in EntityScanner::new(bytes) {
            let type_name = intern_type_name(strings, &record);
            index.insert(EntityRef {
                express_id: record.express_id,
                type_name,
                byte_offset: record.byte_offset,
                byte_length: record.byte_length,
                line_number: record.line_number,
            });
            yield_point.tick();
        }

        index
    }

    /// Add a record; a repeated id is dropped
    pub fn insert(&mut self, entity_ref: EntityRef) -> bool {
        let position = self.refs.len() as u32;
        if let Some(&existing) = self.by_id.get(&entity_ref.express_id) {
            log::warn!(
                "duplicate id #{} on line {} (first seen on line {}); keeping the first",
                entity_ref.express_id,
                entity_ref.line_number,
                self.refs[existing as usize].line_number
            );
            return false;
        }

        self.by_id.insert(entity_ref.express_id, position);
        self.by_type
            .entry(entity_ref.type_name)
            .or_default()
            .push(entity_ref.express_id);
        self.refs.push(entity_ref);
        true
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn get(&self, express_id: u32) -> Option<&EntityRef> {
        self.position(express_id).map(|p| &self.refs[p])
    }

    /// Position of a record in file order
    pub fn position(&self, express_id: u32) -> Option<usize> {
        self.by_id.get(&express_id).map(|&p| p as usize)
    }

    /// Ids of one type, in file order
    pub fn ids_of_type(&self, type_name: StringId) -> &[u32] {
        self.by_type
            .get(&type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Records in file order
    pub fn refs(&self) -> &[EntityRef] {
        &self.refs
    }

    pub fn type_names(&self) -> impl Iterator<Item = StringId> + '_ {
        self.by_type.keys().copied()
    }
}

/// Intern the upper-case spelling, allocating only for lower-case input
fn intern_type_name(strings: &StringTable, record: &ScannedRecord<'_>) -> StringId {
    if record.type_name.bytes().any(|b| b.is_ascii_lowercase()) {
        strings.intern(&record.type_name.to_ascii_uppercase())
    } else {
        strings.intern(record.type_name)
    }
}
