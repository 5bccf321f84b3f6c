// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property and quantity tables
//!
//! Property sets come from IfcPropertySet entities (or namespaced IFCX
//! attributes), quantities from IfcElementQuantity entities (or
//! `…::quantity::` attributes). Both are stored as flat rows keyed by
//! `(entity, set name, item name)` and regrouped into named sets on read.

use crate::{EntityId, IfcType, StringId, StringTable};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of a property value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyValueType {
    Null,
    Boolean,
    Integer,
    Real,
    Text,
    List,
}

/// Typed property value
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn value_type(&self) -> PropertyValueType {
        match self {
            PropertyValue::Null => PropertyValueType::Null,
            PropertyValue::Boolean(_) => PropertyValueType::Boolean,
            PropertyValue::Integer(_) => PropertyValueType::Integer,
            PropertyValue::Real(_) => PropertyValueType::Real,
            PropertyValue::Text(_) => PropertyValueType::Text,
            PropertyValue::List(_) => PropertyValueType::List,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Real(v) => Some(*v),
            PropertyValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Real(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => Ok(()),
            PropertyValue::Boolean(true) => f.write_str("True"),
            PropertyValue::Boolean(false) => f.write_str("False"),
            PropertyValue::Integer(v) => write!(f, "{}", v),
            PropertyValue::Real(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{:.0}", v)
                } else {
                    let formatted = format!("{:.6}", v);
                    f.write_str(formatted.trim_end_matches('0').trim_end_matches('.'))
                }
            }
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

/// A single property value with optional unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
    pub unit: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: None,
        }
    }

    pub fn with_unit(
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: Some(unit.into()),
        }
    }

    /// Value with unit suffix, as shown in property panels
    pub fn formatted(&self) -> String {
        match &self.unit {
            Some(unit) if !unit.is_empty() => format!("{} {}", self.value, unit),
            _ => self.value.to_string(),
        }
    }
}

/// A named group of properties (e.g. "Pset_WallCommon")
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
    /// Defining entity, when the set is an entity of its own
    pub id: Option<EntityId>,
    pub name: String,
    pub properties: Vec<Property>,
}

impl PropertySet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn add(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Quantity types supported in IFC
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityType {
    Length,
    Area,
    Volume,
    Count,
    Weight,
    Time,
}

impl QuantityType {
    pub fn default_unit(&self) -> &'static str {
        match self {
            QuantityType::Length => "m",
            QuantityType::Area => "m²",
            QuantityType::Volume => "m³",
            QuantityType::Count => "",
            QuantityType::Weight => "kg",
            QuantityType::Time => "s",
        }
    }

    /// Map an IfcQuantity* entity type
    pub fn from_ifc_type(ifc_type: &IfcType) -> Option<Self> {
        match ifc_type {
            IfcType::IfcQuantityLength => Some(QuantityType::Length),
            IfcType::IfcQuantityArea => Some(QuantityType::Area),
            IfcType::IfcQuantityVolume => Some(QuantityType::Volume),
            IfcType::IfcQuantityCount => Some(QuantityType::Count),
            IfcType::IfcQuantityWeight => Some(QuantityType::Weight),
            IfcType::IfcQuantityTime => Some(QuantityType::Time),
            _ => None,
        }
    }

    /// Guess the type of a quantity from its name ("NetSideArea" → Area)
    pub fn infer_from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("area") {
            QuantityType::Area
        } else if lower.contains("volume") {
            QuantityType::Volume
        } else if lower.contains("weight") || lower.contains("mass") {
            QuantityType::Weight
        } else if lower.contains("time") || lower.contains("duration") {
            QuantityType::Time
        } else if ["length", "width", "height", "depth", "perimeter", "thickness"]
            .iter()
            .any(|word| lower.contains(word))
        {
            QuantityType::Length
        } else {
            QuantityType::Count
        }
    }
}

/// A quantity value with type and unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub quantity_type: QuantityType,
    pub formula: Option<String>,
}

impl Quantity {
    pub fn new(name: impl Into<String>, value: f64, quantity_type: QuantityType) -> Self {
        Self {
            name: name.into(),
            value,
            unit: quantity_type.default_unit().to_string(),
            quantity_type,
            formula: None,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn formatted(&self) -> String {
        if self.unit.is_empty() {
            format!("{}", self.value)
        } else {
            format!("{} {}", self.value, self.unit)
        }
    }
}

/// A named group of quantities (e.g. "Qto_WallBaseQuantities")
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantitySet {
    pub id: Option<EntityId>,
    pub name: String,
    pub quantities: Vec<Quantity>,
}

impl QuantitySet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            quantities: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.quantities.iter().find(|q| q.name == name)
    }
}

/// Flat `(entity, set, item)` rows shared by both tables
struct SetRows<V> {
    entity: Vec<EntityId>,
    set_id: Vec<Option<EntityId>>,
    set_name: Vec<StringId>,
    name: Vec<StringId>,
    value: Vec<V>,
}

impl<V> SetRows<V> {
    fn new() -> Self {
        Self {
            entity: Vec::new(),
            set_id: Vec::new(),
            set_name: Vec::new(),
            name: Vec::new(),
            value: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.entity.len()
    }
}

struct SetRowsBuilder<V> {
    rows: SetRows<V>,
    index: FxHashMap<(EntityId, StringId, StringId), usize>,
}

impl<V> SetRowsBuilder<V> {
    fn new() -> Self {
        Self {
            rows: SetRows::new(),
            index: FxHashMap::default(),
        }
    }

    /// Insert a row, replacing the value of an existing `(entity, set, name)`
    fn upsert(
        &mut self,
        entity: EntityId,
        set_id: Option<EntityId>,
        set_name: StringId,
        name: StringId,
        value: V,
    ) {
        if let Some(&row) = self.index.get(&(entity, set_name, name)) {
            self.rows.value[row] = value;
            self.rows.set_id[row] = set_id;
            return;
        }

        self.index.insert((entity, set_name, name), self.rows.len());
        self.rows.entity.push(entity);
        self.rows.set_id.push(set_id);
        self.rows.set_name.push(set_name);
        self.rows.name.push(name);
        self.rows.value.push(value);
    }

    fn build(self) -> (SetRows<V>, FxHashMap<EntityId, Vec<u32>>) {
        let mut by_entity: FxHashMap<EntityId, Vec<u32>> = FxHashMap::default();
        for (row, entity) in self.rows.entity.iter().enumerate() {
            by_entity.entry(*entity).or_default().push(row as u32);
        }
        (self.rows, by_entity)
    }
}

/// Group the rows of one entity by set name, in first-seen order
fn group_rows<S>(
    rows: &[u32],
    set_name: &[StringId],
    mut open: impl FnMut(usize) -> S,
    mut push: impl FnMut(&mut S, usize),
) -> Vec<S> {
    let mut sets: Vec<S> = Vec::new();
    let mut slot: FxHashMap<StringId, usize> = FxHashMap::default();

    for &row in rows {
        let row = row as usize;
        let index = *slot.entry(set_name[row]).or_insert_with(|| {
            sets.push(open(row));
            sets.len() - 1
        });
        push(&mut sets[index], row);
    }
    sets
}

#[derive(Clone, Debug)]
struct PropertyCell {
    value: PropertyValue,
    unit: Option<StringId>,
}

/// Accumulates property rows
pub struct PropertyTableBuilder {
    strings: Arc<StringTable>,
    rows: SetRowsBuilder<PropertyCell>,
}

impl PropertyTableBuilder {
    pub fn new(strings: Arc<StringTable>) -> Self {
        Self {
            strings,
            rows: SetRowsBuilder::new(),
        }
    }

    pub fn add(
        &mut self,
        entity: EntityId,
        set_id: Option<EntityId>,
        set_name: &str,
        property: &Property,
    ) {
        let cell = PropertyCell {
            value: property.value.clone(),
            unit: property.unit.as_deref().map(|u| self.strings.intern(u)),
        };
        let set_name = self.strings.intern(set_name);
        let name = self.strings.intern(&property.name);
        self.rows.upsert(entity, set_id, set_name, name, cell);
    }

    /// Add every property of a set to an entity
    pub fn add_set(&mut self, entity: EntityId, set: &PropertySet) {
        for property in &set.properties {
            self.add(entity, set.id, &set.name, property);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(self) -> PropertyTable {
        let (rows, by_entity) = self.rows.build();
        PropertyTable {
            strings: self.strings,
            rows,
            by_entity,
        }
    }
}

/// Columnar property rows
pub struct PropertyTable {
    strings: Arc<StringTable>,
    rows: SetRows<PropertyCell>,
    by_entity: FxHashMap<EntityId, Vec<u32>>,
}

impl PropertyTable {
    pub fn empty() -> Self {
        PropertyTableBuilder::new(StringTable::shared()).build()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.len() == 0
    }

    /// Number of entities with at least one property row
    pub fn entity_count(&self) -> usize {
        self.by_entity.len()
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.by_entity.contains_key(&id)
    }

    fn text(&self, id: StringId) -> String {
        self.strings
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn property_at(&self, row: usize) -> Property {
        let cell = &self.rows.value[row];
        Property {
            name: self.text(self.rows.name[row]),
            value: cell.value.clone(),
            unit: cell.unit.map(|u| self.text(u)),
        }
    }

    /// Property sets of an entity, grouped by set name
    pub fn get_for_entity(&self, id: EntityId) -> Vec<PropertySet> {
        let Some(rows) = self.by_entity.get(&id) else {
            return Vec::new();
        };

        group_rows(
            rows,
            &self.rows.set_name,
            |row| PropertySet {
                id: self.rows.set_id[row],
                name: self.text(self.rows.set_name[row]),
                properties: Vec::new(),
            },
            |set, row| set.properties.push(self.property_at(row)),
        )
    }

    /// First property called `name` on an entity, across all sets
    pub fn get_property(&self, id: EntityId, name: &str) -> Option<Property> {
        let name = self.strings.lookup(name)?;
        let rows = self.by_entity.get(&id)?;
        rows.iter()
            .map(|&row| row as usize)
            .find(|&row| self.rows.name[row] == name)
            .map(|row| self.property_at(row))
    }
}

impl fmt::Debug for PropertyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTable")
            .field("rows", &self.len())
            .field("entities", &self.entity_count())
            .finish()
    }
}

#[derive(Clone, Debug)]
struct QuantityCell {
    value: f64,
    quantity_type: QuantityType,
    unit: StringId,
    formula: Option<StringId>,
}

/// Accumulates quantity rows
pub struct QuantityTableBuilder {
    strings: Arc<StringTable>,
    rows: SetRowsBuilder<QuantityCell>,
}

impl QuantityTableBuilder {
    pub fn new(strings: Arc<StringTable>) -> Self {
        Self {
            strings,
            rows: SetRowsBuilder::new(),
        }
    }

    pub fn add(
        &mut self,
        entity: EntityId,
        set_id: Option<EntityId>,
        set_name: &str,
        quantity: &Quantity,
    ) {
        let cell = QuantityCell {
            value: quantity.value,
            quantity_type: quantity.quantity_type,
            unit: self.strings.intern(&quantity.unit),
            formula: quantity.formula.as_deref().map(|f| self.strings.intern(f)),
        };
        let set_name = self.strings.intern(set_name);
        let name = self.strings.intern(&quantity.name);
        self.rows.upsert(entity, set_id, set_name, name, cell);
    }

    pub fn add_set(&mut self, entity: EntityId, set: &QuantitySet) {
        for quantity in &set.quantities {
            self.add(entity, set.id, &set.name, quantity);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(self) -> QuantityTable {
        let (rows, by_entity) = self.rows.build();
        QuantityTable {
            strings: self.strings,
            rows,
            by_entity,
        }
    }
}

/// Columnar quantity rows
pub struct QuantityTable {
    strings: Arc<StringTable>,
    rows: SetRows<QuantityCell>,
    by_entity: FxHashMap<EntityId, Vec<u32>>,
}

impl QuantityTable {
    pub fn empty() -> Self {
        QuantityTableBuilder::new(StringTable::shared()).build()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.len() == 0
    }

    pub fn entity_count(&self) -> usize {
        self.by_entity.len()
    }

    fn text(&self, id: StringId) -> String {
        self.strings
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn quantity_at(&self, row: usize) -> Quantity {
        let cell = &self.rows.value[row];
        Quantity {
            name: self.text(self.rows.name[row]),
            value: cell.value,
            unit: self.text(cell.unit),
            quantity_type: cell.quantity_type,
            formula: cell.formula.map(|f| self.text(f)),
        }
    }

    /// Quantity sets of an entity, grouped by set name
    pub fn get_for_entity(&self, id: EntityId) -> Vec<QuantitySet> {
        let Some(rows) = self.by_entity.get(&id) else {
            return Vec::new();
        };

        group_rows(
            rows,
            &self.rows.set_name,
            |row| QuantitySet {
                id: self.rows.set_id[row],
                name: self.text(self.rows.set_name[row]),
                quantities: Vec::new(),
            },
            |set, row| set.quantities.push(self.quantity_at(row)),
        )
    }

    /// Sum of every quantity called `quantity_name` across all entities
    pub fn sum_by_type(&self, quantity_name: &str) -> f64 {
        let Some(name) = self.strings.lookup(quantity_name) else {
            return 0.0;
        };
        self.rows
            .name
            .iter()
            .zip(&self.rows.value)
            .filter(|(n, _)| **n == name)
            .map(|(_, cell)| cell.value)
            .sum()
    }

    /// Sum of `quantity_name` restricted to the given entities
    pub fn sum_for_entities(&self, quantity_name: &str, entities: &[EntityId]) -> f64 {
        let Some(name) = self.strings.lookup(quantity_name) else {
            return 0.0;
        };
        entities
            .iter()
            .filter_map(|id| self.by_entity.get(id))
            .flatten()
            .map(|&row| row as usize)
            .filter(|&row| self.rows.name[row] == name)
            .map(|row| self.rows.value[row].value)
            .sum()
    }
}

impl fmt::Debug for QuantityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantityTable")
            .field("rows", &self.len())
            .field("entities", &self.entity_count())
            .finish()
    }
}

/// On-demand property and quantity access
///
/// Implemented by readers that walk relationship entities the first time
/// an element's sets are requested, for files too large to materialize
/// every property row up front.
pub trait PropertyReader: Send + Sync {
    fn property_sets(&self, id: EntityId) -> Vec<PropertySet>;

    fn quantity_sets(&self, id: EntityId) -> Vec<QuantitySet>;

    /// First property with the given name, across all sets
    fn get_property(&self, id: EntityId, name: &str) -> Option<Property> {
        self.property_sets(id)
            .into_iter()
            .flat_map(|set| set.properties)
            .find(|p| p.name == name)
    }

    fn get_quantity(&self, id: EntityId, name: &str) -> Option<Quantity> {
        self.quantity_sets(id)
            .into_iter()
            .flat_map(|set| set.quantities)
            .find(|q| q.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_group_by_set_in_first_seen_order() {
        let mut builder = PropertyTableBuilder::new(StringTable::shared());
        let wall = EntityId(10);
        builder.add(wall, Some(EntityId(50)), "Pset_WallCommon", &Property::new("FireRating", "2HR"));
        builder.add(wall, None, "Attributes", &Property::new("Name", "Wall-01"));
        builder.add(wall, Some(EntityId(50)), "Pset_WallCommon", &Property::new("IsExternal", true));
        let table = builder.build();

        let sets = table.get_for_entity(wall);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].name, "Pset_WallCommon");
        assert_eq!(sets[0].id, Some(EntityId(50)));
        assert_eq!(sets[0].properties.len(), 2);
        assert_eq!(sets[1].get("Name").map(|p| p.value.to_string()), Some("Wall-01".into()));
        assert!(table.get_for_entity(EntityId(11)).is_empty());
    }

    #[test]
    fn test_readding_a_triple_replaces_value() {
        let mut builder = PropertyTableBuilder::new(StringTable::shared());
        let wall = EntityId(1);
        builder.add(wall, None, "Pset", &Property::new("FireRating", "1HR"));
        builder.add(wall, None, "Pset", &Property::new("FireRating", "2HR"));
        let table = builder.build();

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get_property(wall, "FireRating").map(|p| p.value),
            Some(PropertyValue::Text("2HR".into()))
        );
    }

    #[test]
    fn test_quantity_sums() {
        let mut builder = QuantityTableBuilder::new(StringTable::shared());
        builder.add(EntityId(1), None, "Qto", &Quantity::new("NetVolume", 2.5, QuantityType::Volume));
        builder.add(EntityId(2), None, "Qto", &Quantity::new("NetVolume", 1.5, QuantityType::Volume));
        builder.add(EntityId(2), None, "Qto", &Quantity::new("Length", 9.0, QuantityType::Length));
        let table = builder.build();

        assert_eq!(table.sum_by_type("NetVolume"), 4.0);
        assert_eq!(table.sum_for_entities("NetVolume", &[EntityId(2)]), 1.5);
        assert_eq!(table.sum_by_type("Missing"), 0.0);
        assert_eq!(table.get_for_entity(EntityId(2))[0].quantities.len(), 2);
    }

    #[test]
    fn test_infer_quantity_type() {
        assert_eq!(QuantityType::infer_from_name("NetSideArea"), QuantityType::Area);
        assert_eq!(QuantityType::infer_from_name("GrossVolume"), QuantityType::Volume);
        assert_eq!(QuantityType::infer_from_name("Height"), QuantityType::Length);
        assert_eq!(QuantityType::infer_from_name("Mass"), QuantityType::Weight);
        assert_eq!(QuantityType::infer_from_name("Pieces"), QuantityType::Count);
    }

    #[test]
    fn test_value_formatting() {
        assert_eq!(PropertyValue::Real(3.0).to_string(), "3");
        assert_eq!(PropertyValue::Real(0.25).to_string(), "0.25");
        assert_eq!(PropertyValue::Boolean(true).to_string(), "True");
        assert_eq!(Property::with_unit("Width", 0.2, "m").formatted(), "0.2 m");
    }
}
