// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Columnar entity table
//!
//! One row per entity, stored as parallel arrays. Rows added without their
//! text columns (global id, name, description, object type) are hydrated
//! the first time one of those columns is read, by decoding the entity
//! through the attached [`EntityResolver`]. This lets a 500k-entity file
//! get a complete table without 500k attribute parses up front.

use crate::{DecodedEntity, EntityId, EntityResolver, IfcType, StringId, StringTable};
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

/// IfcRoot attribute positions
const GLOBAL_ID_INDEX: usize = 0;
const NAME_INDEX: usize = 2;
const DESCRIPTION_INDEX: usize = 3;
const OBJECT_TYPE_INDEX: usize = 4;

/// Text columns of one row
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EntityText<'a> {
    pub global_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub object_type: &'a str,
}

impl<'a> EntityText<'a> {
    /// Read the IfcRoot text attributes of a decoded entity
    pub fn from_entity(entity: &'a DecodedEntity) -> Self {
        Self {
            global_id: entity.get_string(GLOBAL_ID_INDEX).unwrap_or(""),
            name: entity.get_string(NAME_INDEX).unwrap_or(""),
            description: entity.get_string(DESCRIPTION_INDEX).unwrap_or(""),
            object_type: entity.get_string(OBJECT_TYPE_INDEX).unwrap_or(""),
        }
    }
}

/// Row passed to [`EntityTableBuilder::add`]
#[derive(Clone, Copy, Debug)]
pub struct EntityRow<'a> {
    pub express_id: u32,
    /// Interned upper-case type name
    pub type_name: StringId,
    /// `None` defers the text columns to on-demand extraction
    pub text: Option<EntityText<'a>>,
    pub has_geometry: bool,
    pub is_type: bool,
}

#[derive(Clone, Copy)]
enum TextColumn {
    GlobalId,
    Name,
    Description,
    ObjectType,
}

/// Accumulates rows for an [`EntityTable`]
pub struct EntityTableBuilder {
    strings: Arc<StringTable>,
    express_id: Vec<u32>,
    type_name: Vec<StringId>,
    global_id: Vec<OnceLock<StringId>>,
    name: Vec<OnceLock<StringId>>,
    description: Vec<OnceLock<StringId>>,
    object_type: Vec<OnceLock<StringId>>,
    has_geometry: Vec<bool>,
    is_type: Vec<bool>,
}

impl EntityTableBuilder {
    pub fn new(strings: Arc<StringTable>) -> Self {
        Self::with_capacity(strings, 0)
    }

    pub fn with_capacity(strings: Arc<StringTable>, capacity: usize) -> Self {
        Self {
            strings,
            express_id: Vec::with_capacity(capacity),
            type_name: Vec::with_capacity(capacity),
            global_id: Vec::with_capacity(capacity),
            name: Vec::with_capacity(capacity),
            description: Vec::with_capacity(capacity),
            object_type: Vec::with_capacity(capacity),
            has_geometry: Vec::with_capacity(capacity),
            is_type: Vec::with_capacity(capacity),
        }
    }

    /// Interner shared with the resulting table
    pub fn strings(&self) -> &Arc<StringTable> {
        &self.strings
    }

    pub fn add(&mut self, row: EntityRow<'_>) {
        let cell = |text: Option<&str>| match text {
            Some(value) => OnceLock::from(self.strings.intern(value)),
            None => OnceLock::new(),
        };

        let text = row.text;
        let global_id = cell(text.map(|t| t.global_id));
        let name = cell(text.map(|t| t.name));
        let description = cell(text.map(|t| t.description));
        let object_type = cell(text.map(|t| t.object_type));

        self.express_id.push(row.express_id);
        self.type_name.push(row.type_name);
        self.global_id.push(global_id);
        self.name.push(name);
        self.description.push(description);
        self.object_type.push(object_type);
        self.has_geometry.push(row.has_geometry);
        self.is_type.push(row.is_type);
    }

    pub fn len(&self) -> usize {
        self.express_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.express_id.is_empty()
    }

    /// Freeze the rows into a table
    ///
    /// `resolver` supplies attributes for rows added without text. Without
    /// one, deferred text columns read as empty strings.
    pub fn build(self, resolver: Option<Arc<dyn EntityResolver>>) -> EntityTable {
        let mut row_by_id = FxHashMap::with_capacity_and_hasher(self.len(), Default::default());
        let mut by_type: FxHashMap<StringId, Vec<EntityId>> = FxHashMap::default();

        for (row, (&id, &ty)) in self.express_id.iter().zip(&self.type_name).enumerate() {
            row_by_id.insert(id, row as u32);
            by_type.entry(ty).or_default().push(EntityId(id));
        }

        EntityTable {
            strings: self.strings,
            express_id: self.express_id,
            type_name: self.type_name,
            global_id: self.global_id,
            name: self.name,
            description: self.description,
            object_type: self.object_type,
            has_geometry: self.has_geometry,
            is_type: self.is_type,
            row_by_id,
            by_type,
            resolver,
        }
    }
}

/// Structure-of-arrays entity table
///
/// Row `i` corresponds across every column; `count()` equals the number of
/// `add` calls made on the builder.
pub struct EntityTable {
    strings: Arc<StringTable>,
    express_id: Vec<u32>,
    type_name: Vec<StringId>,
    global_id: Vec<OnceLock<StringId>>,
    name: Vec<OnceLock<StringId>>,
    description: Vec<OnceLock<StringId>>,
    object_type: Vec<OnceLock<StringId>>,
    has_geometry: Vec<bool>,
    is_type: Vec<bool>,
    row_by_id: FxHashMap<u32, u32>,
    by_type: FxHashMap<StringId, Vec<EntityId>>,
    resolver: Option<Arc<dyn EntityResolver>>,
}

impl EntityTable {
    /// Table with no rows
    pub fn empty() -> Self {
        EntityTableBuilder::new(StringTable::shared()).build(None)
    }

    pub fn count(&self) -> usize {
        self.express_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.express_id.is_empty()
    }

    pub fn strings(&self) -> &Arc<StringTable> {
        &self.strings
    }

    /// Express ids in row order
    pub fn express_ids(&self) -> &[u32] {
        &self.express_id
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.row_by_id.contains_key(&id.0)
    }

    pub fn row_of(&self, id: EntityId) -> Option<usize> {
        self.row_by_id.get(&id.0).map(|&row| row as usize)
    }

    pub fn get_type_name(&self, id: EntityId) -> Option<Arc<str>> {
        let row = self.row_of(id)?;
        self.strings.resolve(self.type_name[row])
    }

    pub fn get_ifc_type(&self, id: EntityId) -> Option<IfcType> {
        self.get_type_name(id).map(|name| IfcType::parse(&name))
    }

    pub fn get_global_id(&self, id: EntityId) -> Option<Arc<str>> {
        self.text(id, TextColumn::GlobalId)
    }

    pub fn get_name(&self, id: EntityId) -> Option<Arc<str>> {
        self.text(id, TextColumn::Name)
    }

    pub fn get_description(&self, id: EntityId) -> Option<Arc<str>> {
        self.text(id, TextColumn::Description)
    }

    pub fn get_object_type(&self, id: EntityId) -> Option<Arc<str>> {
        self.text(id, TextColumn::ObjectType)
    }

    pub fn has_geometry(&self, id: EntityId) -> bool {
        self.row_of(id).is_some_and(|row| self.has_geometry[row])
    }

    pub fn is_type(&self, id: EntityId) -> bool {
        self.row_of(id).is_some_and(|row| self.is_type[row])
    }

    /// Whether the text columns of a row are already populated
    pub fn is_hydrated(&self, id: EntityId) -> bool {
        self.row_of(id)
            .is_some_and(|row| self.name[row].get().is_some())
    }

    /// Ids of every entity with the given type name (case-insensitive)
    pub fn ids_by_type(&self, type_name: &str) -> &[EntityId] {
        self.strings
            .lookup(&type_name.to_ascii_uppercase())
            .and_then(|ty| self.by_type.get(&ty))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entity count per type name, most frequent first
    pub fn type_counts(&self) -> Vec<(Arc<str>, usize)> {
        let mut counts: Vec<_> = self
            .by_type
            .iter()
            .filter_map(|(ty, ids)| Some((self.strings.resolve(*ty)?, ids.len())))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    fn column(&self, column: TextColumn) -> &[OnceLock<StringId>] {
        match column {
            TextColumn::GlobalId => &self.global_id,
            TextColumn::Name => &self.name,
            TextColumn::Description => &self.description,
            TextColumn::ObjectType => &self.object_type,
        }
    }

    fn text(&self, id: EntityId, column: TextColumn) -> Option<Arc<str>> {
        let row = self.row_of(id)?;
        let cell = &self.column(column)[row];
        let value = match cell.get() {
            Some(value) => *value,
            None => {
                self.hydrate(row);
                cell.get().copied().unwrap_or(StringId::EMPTY)
            }
        };
        self.strings.resolve(value)
    }

    /// Fill every text column of a deferred row from its decoded attributes
    fn hydrate(&self, row: usize) {
        let entity = self
            .resolver
            .as_ref()
            .and_then(|resolver| resolver.get(EntityId(self.express_id[row])));

        let text = entity
            .as_deref()
            .map(EntityText::from_entity)
            .unwrap_or_default();

        if entity.is_none() {
            log::trace!(
                "no attributes available for #{}; text columns stay empty",
                self.express_id[row]
            );
        }

        self.global_id[row].get_or_init(|| self.strings.intern(text.global_id));
        self.name[row].get_or_init(|| self.strings.intern(text.name));
        self.description[row].get_or_init(|| self.strings.intern(text.description));
        self.object_type[row].get_or_init(|| self.strings.intern(text.object_type));
    }
}

impl std::fmt::Debug for EntityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTable")
            .field("count", &self.count())
            .field("types", &self.by_type.len())
            .field("on_demand", &self.resolver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttributeValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        entity: Arc<DecodedEntity>,
        calls: AtomicUsize,
    }

    impl EntityResolver for CountingResolver {
        fn get(&self, id: EntityId) -> Option<Arc<DecodedEntity>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (id == self.entity.id).then(|| Arc::clone(&self.entity))
        }

        fn ids_by_type(&self, _ifc_type: &IfcType) -> Vec<EntityId> {
            vec![self.entity.id]
        }

        fn type_of(&self, id: EntityId) -> Option<IfcType> {
            (id == self.entity.id).then(|| self.entity.ifc_type.clone())
        }

        fn entity_count(&self) -> usize {
            1
        }
    }

    fn wall() -> Arc<DecodedEntity> {
        Arc::new(DecodedEntity {
            id: EntityId(10),
            ifc_type: IfcType::IfcWall,
            attributes: vec![
                AttributeValue::String("ABC123".into()),
                AttributeValue::Null,
                AttributeValue::String("Wall-01".into()),
                AttributeValue::Null,
                AttributeValue::String("Basic Wall".into()),
            ],
        })
    }

    #[test]
    fn test_eager_rows() {
        let strings = StringTable::shared();
        let mut builder = EntityTableBuilder::new(Arc::clone(&strings));
        let ty = strings.intern("IFCBUILDINGSTOREY");
        builder.add(EntityRow {
            express_id: 3,
            type_name: ty,
            text: Some(EntityText {
                global_id: "g3",
                name: "Level 1",
                ..Default::default()
            }),
            has_geometry: false,
            is_type: false,
        });
        let table = builder.build(None);

        assert_eq!(table.count(), 1);
        assert_eq!(table.get_name(EntityId(3)).as_deref(), Some("Level 1"));
        assert_eq!(table.get_global_id(EntityId(3)).as_deref(), Some("g3"));
        assert_eq!(table.get_ifc_type(EntityId(3)), Some(IfcType::IfcBuildingStorey));
        assert_eq!(table.ids_by_type("IfcBuildingStorey"), &[EntityId(3)]);
    }

    #[test]
    fn test_deferred_rows_hydrate_once() {
        let strings = StringTable::shared();
        let resolver = Arc::new(CountingResolver {
            entity: wall(),
            calls: AtomicUsize::new(0),
        });

        let mut builder = EntityTableBuilder::new(Arc::clone(&strings));
        builder.add(EntityRow {
            express_id: 10,
            type_name: strings.intern("IFCWALL"),
            text: None,
            has_geometry: true,
            is_type: false,
        });
        let table = builder.build(Some(resolver.clone() as Arc<dyn EntityResolver>));

        assert!(!table.is_hydrated(EntityId(10)));
        assert_eq!(table.get_global_id(EntityId(10)).as_deref(), Some("ABC123"));
        assert_eq!(table.get_name(EntityId(10)).as_deref(), Some("Wall-01"));
        assert_eq!(table.get_object_type(EntityId(10)).as_deref(), Some("Basic Wall"));
        assert_eq!(table.get_description(EntityId(10)).as_deref(), Some(""));
        assert!(table.is_hydrated(EntityId(10)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_rows_and_no_resolver() {
        let strings = StringTable::shared();
        let mut builder = EntityTableBuilder::new(Arc::clone(&strings));
        builder.add(EntityRow {
            express_id: 5,
            type_name: strings.intern("IFCSLAB"),
            text: None,
            has_geometry: true,
            is_type: false,
        });
        let table = builder.build(None);

        assert_eq!(table.get_name(EntityId(5)).as_deref(), Some(""));
        assert!(table.get_name(EntityId(99)).is_none());
        assert!(!table.has_geometry(EntityId(99)));
        assert!(table.ids_by_type("IFCWALL").is_empty());
    }

    #[test]
    fn test_count_matches_adds_in_any_order() {
        let strings = StringTable::shared();
        let mut builder = EntityTableBuilder::new(Arc::clone(&strings));
        let ty = strings.intern("IFCWALL");
        for id in [9, 2, 7, 4] {
            builder.add(EntityRow {
                express_id: id,
                type_name: ty,
                text: None,
                has_geometry: true,
                is_type: false,
            });
        }
        let table = builder.build(None);

        assert_eq!(table.count(), 4);
        assert_eq!(table.express_ids(), &[9, 2, 7, 4]);
        assert_eq!(table.row_of(EntityId(7)), Some(2));
        assert_eq!(table.type_counts()[0].1, 4);
    }
}
