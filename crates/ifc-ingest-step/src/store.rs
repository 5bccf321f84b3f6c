// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lazy entity store
//!
//! Each record starts out `Unparsed` (only its byte range is known) and
//! becomes `Parsed` the first time it is requested. The parsed attributes
//! are cached, so every later lookup is a clone of an `Arc`.

use crate::extractor::AttributeExtractor;
use crate::index::{EntityIndex, EntityRef};
use ifc_ingest_model::{DecodedEntity, EntityId, EntityResolver, IfcType, StringTable};
use std::sync::{Arc, OnceLock};

/// Parse state of one record
#[derive(Clone, Debug)]
pub enum EntityState<'a> {
    Unparsed(&'a EntityRef),
    Parsed(&'a EntityRef, Arc<DecodedEntity>),
}

impl EntityState<'_> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, EntityState::Parsed(..))
    }
}

/// Owns the buffer and resolves records on demand
pub struct EntityStore {
    content: Arc<[u8]>,
    index: EntityIndex,
    strings: Arc<StringTable>,
    /// Parse cache by file position; `Some(None)` marks a record that failed to parse
    parsed: Vec<OnceLock<Option<Arc<DecodedEntity>>>>,
}

impl EntityStore {
    pub fn new(content: Arc<[u8]>, index: EntityIndex, strings: Arc<StringTable>) -> Self {
        let parsed = (0..index.len()).map(|_| OnceLock::new()).collect();
        Self {
            content,
            index,
            strings,
            parsed,
        }
    }

    pub fn index(&self) -> &EntityIndex {
        &self.index
    }

    pub fn strings(&self) -> &Arc<StringTable> {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn state(&self, id: EntityId) -> Option<EntityState<'_>> {
        let position = self.index.position(id.0)?;
        let entity_ref = &self.index.refs()[position];
        Some(match self.parsed[position].get() {
            Some(Some(entity)) => EntityState::Parsed(entity_ref, Arc::clone(entity)),
            _ => EntityState::Unparsed(entity_ref),
        })
    }

    /// Number of records parsed so far
    pub fn parsed_count(&self) -> usize {
        self.parsed
            .iter()
            .filter(|slot| matches!(slot.get(), Some(Some(_))))
            .count()
    }

    /// Upper-case type name of a record, without parsing it
    pub fn type_name(&self, id: EntityId) -> Option<Arc<str>> {
        let entity_ref = self.index.get(id.0)?;
        self.strings.resolve(entity_ref.type_name)
    }

    /// Ids of one type name (case-insensitive), in file order
    pub fn ids_of_type_name(&self, type_name: &str) -> Vec<EntityId> {
        self.strings
            .lookup(&type_name.to_ascii_uppercase())
            .map(|ty| {
                self.index
                    .ids_of_type(ty)
                    .iter()
                    .map(|&id| EntityId(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn load(&self, position: usize) -> Option<Arc<DecodedEntity>> {
        self.parsed[position]
            .get_or_init(|| {
                let entity_ref = &self.index.refs()[position];
                match AttributeExtractor::new(&self.content).extract(entity_ref) {
                    Ok(entity) => Some(Arc::new(entity)),
                    Err(e) => {
                        log::warn!("{}", e);
                        None
                    }
                }
            })
            .clone()
    }
}

impl EntityResolver for EntityStore {
    fn get(&self, id: EntityId) -> Option<Arc<DecodedEntity>> {
        self.load(self.index.position(id.0)?)
    }

    fn ids_by_type(&self, ifc_type: &IfcType) -> Vec<EntityId> {
        self.ids_of_type_name(ifc_type.name())
    }

    fn type_of(&self, id: EntityId) -> Option<IfcType> {
        self.type_name(id).map(|name| IfcType::parse(&name))
    }

    fn entity_count(&self) -> usize {
        self.index.len()
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("bytes", &self.content.len())
            .field("records", &self.index.len())
            .field("parsed", &self.parsed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_ingest_model::YieldPoint;

    fn store(text: &str) -> EntityStore {
        let strings = StringTable::shared();
        let index = EntityIndex::build(text.as_bytes(), &strings, &mut YieldPoint::disabled());
        EntityStore::new(Arc::from(text.as_bytes()), index, strings)
    }

    #[test]
    fn test_records_parse_on_first_access() {
        let store = store("DATA;\n#1=IFCWALL('a',$,'A');\n#2=IFCSLAB('b',$,'B');\n");

        assert!(matches!(store.state(EntityId(1)), Some(EntityState::Unparsed(_))));
        assert_eq!(store.parsed_count(), 0);

        let wall = store.get(EntityId(1)).unwrap();
        assert_eq!(wall.get_string(2), Some("A"));
        assert!(store.state(EntityId(1)).unwrap().is_parsed());
        assert!(!store.state(EntityId(2)).unwrap().is_parsed());

        let again = store.get(EntityId(1)).unwrap();
        assert!(Arc::ptr_eq(&wall, &again));
        assert_eq!(store.parsed_count(), 1);
    }

    #[test]
    fn test_type_queries_do_not_parse() {
        let store = store("DATA;\n#1=IFCWALL($);\n#2=IFCWALL($);\n#3=IFCDOOR($);\n");

        assert_eq!(store.ids_by_type(&IfcType::IfcWall), vec![EntityId(1), EntityId(2)]);
        assert_eq!(store.type_of(EntityId(3)), Some(IfcType::IfcDoor));
        assert_eq!(store.ids_of_type_name("ifcdoor"), vec![EntityId(3)]);
        assert_eq!(store.parsed_count(), 0);
    }

    #[test]
    fn test_malformed_record_resolves_to_none() {
        let store = store("DATA;\n#1=IFCWALL('a',,);\n");
        assert!(store.get(EntityId(1)).is_none());
        assert!(store.get(EntityId(1)).is_none());
        assert!(store.get(EntityId(9)).is_none());
    }
}
