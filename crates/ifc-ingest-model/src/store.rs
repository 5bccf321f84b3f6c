// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The normalized data store handed to consumers

use crate::{
    EntityId, EntityTable, FileFormat, ModelMetadata, PropertyReader, PropertySet,
    PropertyTable, QuantitySet, QuantityTable, RelationshipGraph, SpatialHierarchy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of ingesting one STEP file or one composed IFCX stack
///
/// Property and quantity sets are read through [`IfcDataStore::property_sets`]
/// and [`IfcDataStore::quantity_sets`], which consult the materialized tables
/// first and fall back to the on-demand reader for large STEP files.
pub struct IfcDataStore {
    pub format: FileFormat,
    pub schema_version: String,
    pub metadata: ModelMetadata,
    pub entities: EntityTable,
    pub properties: PropertyTable,
    pub quantities: QuantityTable,
    pub relationships: RelationshipGraph,
    /// `None` when the hierarchy was not requested or could not be derived
    pub spatial_hierarchy: Option<SpatialHierarchy>,
    pub entity_count: usize,
    pub parse_time: Duration,
    /// Factor converting model length units to metres
    pub length_unit_scale: f64,
    pub on_demand: Option<Arc<dyn PropertyReader>>,
}

impl IfcDataStore {
    /// Property sets of an entity
    pub fn property_sets(&self, id: EntityId) -> Vec<PropertySet> {
        if self.properties.has_entity(id) {
            return self.properties.get_for_entity(id);
        }
        self.on_demand
            .as_ref()
            .map(|reader| reader.property_sets(id))
            .unwrap_or_default()
    }

    /// Quantity sets of an entity
    pub fn quantity_sets(&self, id: EntityId) -> Vec<QuantitySet> {
        let sets = self.quantities.get_for_entity(id);
        if !sets.is_empty() {
            return sets;
        }
        self.on_demand
            .as_ref()
            .map(|reader| reader.quantity_sets(id))
            .unwrap_or_default()
    }

    /// Whether property sets are served on demand rather than from the table
    pub fn has_on_demand_properties(&self) -> bool {
        self.on_demand.is_some()
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            format: self.format,
            schema_version: self.schema_version.clone(),
            entity_count: self.entity_count,
            property_rows: self.properties.len(),
            quantity_rows: self.quantities.len(),
            relationship_count: self.relationships.len(),
            storey_count: self
                .spatial_hierarchy
                .as_ref()
                .map_or(0, |h| h.storey_elevations.len().max(h.by_storey.len())),
            parse_time_ms: self.parse_time.as_secs_f64() * 1000.0,
            length_unit_scale: self.length_unit_scale,
        }
    }
}

impl std::fmt::Debug for IfcDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IfcDataStore")
            .field("format", &self.format)
            .field("schema_version", &self.schema_version)
            .field("entities", &self.entities)
            .field("properties", &self.properties)
            .field("quantities", &self.quantities)
            .field("relationships", &self.relationships.len())
            .field("spatial_hierarchy", &self.spatial_hierarchy.is_some())
            .field("parse_time", &self.parse_time)
            .finish()
    }
}

/// Serializable overview of a store, for logs and tooling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub format: FileFormat,
    pub schema_version: String,
    pub entity_count: usize,
    pub property_rows: usize,
    pub quantity_rows: usize,
    pub relationship_count: usize,
    pub storey_count: usize,
    pub parse_time_ms: f64,
    pub length_unit_scale: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Property, PropertyTableBuilder, QuantityTable, StringTable};

    struct FixedReader;

    impl PropertyReader for FixedReader {
        fn property_sets(&self, id: EntityId) -> Vec<PropertySet> {
            let mut set = PropertySet::new("Pset_OnDemand");
            set.add(Property::new("Source", format!("reader {}", id)));
            vec![set]
        }

        fn quantity_sets(&self, _id: EntityId) -> Vec<QuantitySet> {
            Vec::new()
        }
    }

    fn store(properties: PropertyTable, on_demand: Option<Arc<dyn PropertyReader>>) -> IfcDataStore {
        IfcDataStore {
            format: FileFormat::Step,
            schema_version: "IFC4".into(),
            metadata: ModelMetadata::default(),
            entities: EntityTable::empty(),
            properties,
            quantities: QuantityTable::empty(),
            relationships: RelationshipGraph::default(),
            spatial_hierarchy: None,
            entity_count: 0,
            parse_time: Duration::from_millis(12),
            length_unit_scale: 1.0,
            on_demand,
        }
    }

    #[test]
    fn test_table_wins_over_on_demand() {
        let mut builder = PropertyTableBuilder::new(StringTable::shared());
        builder.add(EntityId(1), None, "Pset_Table", &Property::new("A", "1"));
        let store = store(builder.build(), Some(Arc::new(FixedReader)));

        assert_eq!(store.property_sets(EntityId(1))[0].name, "Pset_Table");
        assert_eq!(store.property_sets(EntityId(2))[0].name, "Pset_OnDemand");
        assert!(store.quantity_sets(EntityId(2)).is_empty());
    }

    #[test]
    fn test_without_reader_misses_are_empty() {
        let store = store(PropertyTable::empty(), None);
        assert!(store.property_sets(EntityId(1)).is_empty());
        assert!(!store.has_on_demand_properties());
    }

    #[test]
    fn test_summary_serializes() {
        let store = store(PropertyTable::empty(), None);
        let json = serde_json::to_value(store.summary()).unwrap();
        assert_eq!(json["format"], "Step");
        assert_eq!(json["schema_version"], "IFC4");
        assert_eq!(json["parse_time_ms"], 12.0);
    }
}
