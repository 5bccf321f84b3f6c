// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property set and quantity set extraction
//!
//! Sets reach their elements through IfcRelDefinesByProperties. Small files
//! have every set materialized into the property and quantity tables; large
//! files get an [`OnDemandProperties`] reader that decodes an element's sets
//! the first time they are asked for.

use crate::store::EntityStore;
use ifc_ingest_model::{
    phase, AttributeValue, DecodedEntity, Direction, EntityId, EntityResolver, IfcType,
    ProgressReporter, Property, PropertyReader, PropertySet, PropertyTable,
    PropertyTableBuilder, PropertyValue, Quantity, QuantitySet, QuantityTable,
    QuantityTableBuilder, QuantityType, RelationshipGraph, RelationshipType, StringTable,
    YieldPoint,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Convert a STEP attribute into a property value
pub fn to_property_value(attr: &AttributeValue) -> PropertyValue {
    match attr {
        AttributeValue::String(s) => PropertyValue::Text(s.clone()),
        AttributeValue::Integer(i) => PropertyValue::Integer(*i),
        AttributeValue::Float(f) => PropertyValue::Real(*f),
        AttributeValue::Bool(b) => PropertyValue::Boolean(*b),
        AttributeValue::Enum(e) => PropertyValue::Text(e.clone()),
        AttributeValue::EntityRef(id) => PropertyValue::Text(id.to_string()),
        AttributeValue::List(items) => {
            PropertyValue::List(items.iter().map(to_property_value).collect())
        }
        AttributeValue::TypedValue(_, args) => {
            args.first().map(to_property_value).unwrap_or_default()
        }
        AttributeValue::Null | AttributeValue::Derived => PropertyValue::Null,
    }
}

/// Decodes IfcPropertySet and IfcElementQuantity records
#[derive(Clone, Copy)]
pub struct SetDecoder<'a> {
    resolver: &'a dyn EntityResolver,
}

impl<'a> SetDecoder<'a> {
    pub fn new(resolver: &'a dyn EntityResolver) -> Self {
        Self { resolver }
    }

    /// IfcPropertySet: Name(2), HasProperties(4)
    pub fn property_set(&self, id: EntityId) -> Option<PropertySet> {
        let pset = self.resolver.get(id)?;
        if pset.ifc_type != IfcType::IfcPropertySet {
            return None;
        }

        let properties = pset
            .get_refs(4)
            .into_iter()
            .filter_map(|prop_id| self.resolver.get(prop_id))
            .filter_map(|prop| self.property(&prop))
            .collect();

        Some(PropertySet {
            id: Some(id),
            name: pset.get_string(2).unwrap_or("Unknown").to_string(),
            properties,
        })
    }

    /// IfcElementQuantity: Name(2), Quantities(5)
    pub fn quantity_set(&self, id: EntityId) -> Option<QuantitySet> {
        let qset = self.resolver.get(id)?;
        if qset.ifc_type != IfcType::IfcElementQuantity {
            return None;
        }

        let quantities = qset
            .get_refs(5)
            .into_iter()
            .filter_map(|qty_id| self.resolver.get(qty_id))
            .filter_map(|qty| self.quantity(&qty))
            .collect();

        Some(QuantitySet {
            id: Some(id),
            name: qset.get_string(2).unwrap_or("Unknown").to_string(),
            quantities,
        })
    }

    fn property(&self, prop: &DecodedEntity) -> Option<Property> {
        let name = prop.get_string(0)?.to_string();

        let (value, unit) = match prop.ifc_type {
            // NominalValue(2), Unit(3)
            IfcType::IfcPropertySingleValue => (
                to_property_value(prop.get(2)?),
                prop.get(3).and_then(|u| self.unit_symbol(u)),
            ),
            // EnumerationValues(2)
            IfcType::IfcPropertyEnumeratedValue | IfcType::IfcPropertyListValue => {
                let values = prop.get_list(2)?;
                let value = match values {
                    [single] if prop.ifc_type == IfcType::IfcPropertyEnumeratedValue => {
                        to_property_value(single)
                    }
                    _ => PropertyValue::List(values.iter().map(to_property_value).collect()),
                };
                (value, None)
            }
            // UpperBoundValue(2), LowerBoundValue(3), Unit(4)
            IfcType::IfcPropertyBoundedValue => {
                let upper = prop.get(2).map(to_property_value).unwrap_or_default();
                let lower = prop.get(3).map(to_property_value).unwrap_or_default();
                let text = match (lower, upper) {
                    (PropertyValue::Null, PropertyValue::Null) => return None,
                    (lower, PropertyValue::Null) => format!(">= {}", lower),
                    (PropertyValue::Null, upper) => format!("<= {}", upper),
                    (lower, upper) => format!("{} - {}", lower, upper),
                };
                (
                    PropertyValue::Text(text),
                    prop.get(4).and_then(|u| self.unit_symbol(u)),
                )
            }
            _ => return None,
        };

        Some(Property { name, value, unit })
    }

    /// IfcPhysicalSimpleQuantity: Name(0), Unit(2), value(3), Formula(4)
    fn quantity(&self, qty: &DecodedEntity) -> Option<Quantity> {
        let quantity_type = QuantityType::from_ifc_type(&qty.ifc_type)?;
        let mut quantity = Quantity::new(qty.get_string(0)?, qty.get_float(3)?, quantity_type);

        if let Some(unit) = qty.get(2).and_then(|u| self.unit_symbol(u)) {
            quantity.unit = unit;
        }
        quantity.formula = qty.get_string(4).map(str::to_string);
        Some(quantity)
    }

    /// Readable symbol for a referenced unit entity
    fn unit_symbol(&self, attr: &AttributeValue) -> Option<String> {
        let unit = self.resolver.get(attr.as_entity_ref()?)?;

        match unit.ifc_type {
            IfcType::IfcSIUnit => {
                let prefix = match unit.get_enum(2).unwrap_or("") {
                    "KILO" => "k",
                    "CENTI" => "c",
                    "MILLI" => "m",
                    "MICRO" => "µ",
                    _ => "",
                };
                let name = unit.get_enum(3)?;
                let symbol = match name {
                    "METRE" => "m",
                    "SQUARE_METRE" => "m²",
                    "CUBIC_METRE" => "m³",
                    "GRAM" => "g",
                    "SECOND" => "s",
                    "KELVIN" => "K",
                    "AMPERE" => "A",
                    "WATT" => "W",
                    "PASCAL" => "Pa",
                    _ => name,
                };
                Some(format!("{}{}", prefix, symbol))
            }
            // Name(2)
            IfcType::IfcConversionBasedUnit => unit.get_string(2).map(str::to_string),
            _ => None,
        }
    }
}

/// `element → defining set ids`, split by set kind
#[derive(Debug, Default)]
pub struct DefinitionMaps {
    pub property_sets: FxHashMap<EntityId, Vec<EntityId>>,
    pub quantity_sets: FxHashMap<EntityId, Vec<EntityId>>,
}

impl DefinitionMaps {
    /// Classify the source of every DefinesByProperties edge by its type name
    pub fn from_graph(graph: &RelationshipGraph, resolver: &dyn EntityResolver) -> Self {
        let mut maps = Self::default();
        let mut kinds: FxHashMap<EntityId, Option<IfcType>> = FxHashMap::default();

        for edge in graph.edges_of_type(RelationshipType::DefinesByProperties) {
            let kind = kinds
                .entry(edge.source)
                .or_insert_with(|| resolver.type_of(edge.source));
            let map = match kind {
                Some(IfcType::IfcPropertySet) => &mut maps.property_sets,
                Some(IfcType::IfcElementQuantity) => &mut maps.quantity_sets,
                _ => continue,
            };
            let sets = map.entry(edge.target).or_default();
            if !sets.contains(&edge.source) {
                sets.push(edge.source);
            }
        }
        maps
    }
}

/// Lazily decoded property and quantity sets
pub struct OnDemandProperties {
    store: Arc<EntityStore>,
    maps: DefinitionMaps,
}

impl OnDemandProperties {
    pub fn new(store: Arc<EntityStore>, maps: DefinitionMaps) -> Self {
        Self { store, maps }
    }

    /// Build the maps from the graph's DefinesByProperties edges
    pub fn from_graph(store: Arc<EntityStore>, graph: &RelationshipGraph) -> Self {
        let maps = DefinitionMaps::from_graph(graph, store.as_ref());
        Self::new(store, maps)
    }

    pub fn elements_with_properties(&self) -> usize {
        self.maps.property_sets.len()
    }
}

impl PropertyReader for OnDemandProperties {
    fn property_sets(&self, id: EntityId) -> Vec<PropertySet> {
        let decoder = SetDecoder::new(self.store.as_ref());
        self.maps
            .property_sets
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&set| decoder.property_set(set))
            .collect()
    }

    fn quantity_sets(&self, id: EntityId) -> Vec<QuantitySet> {
        let decoder = SetDecoder::new(self.store.as_ref());
        self.maps
            .quantity_sets
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&set| decoder.quantity_set(set))
            .collect()
    }
}

/// Decode every defined set into property and quantity tables
///
/// Each set is decoded once even when it is shared by many elements.
pub fn materialize(
    store: &EntityStore,
    maps: &DefinitionMaps,
    strings: Arc<StringTable>,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
) -> (PropertyTable, QuantityTable) {
    let decoder = SetDecoder::new(store);

    progress.start(phase::PROPERTIES);
    let mut properties = PropertyTableBuilder::new(Arc::clone(&strings));
    let mut decoded: FxHashMap<EntityId, Option<PropertySet>> = FxHashMap::default();
    let total = maps.property_sets.len();
    for (done, (element, sets)) in sorted(&maps.property_sets).into_iter().enumerate() {
        for set_id in sets {
            let set = decoded
                .entry(*set_id)
                .or_insert_with(|| decoder.property_set(*set_id));
            if let Some(set) = set {
                properties.add_set(element, set);
            }
        }
        if yield_point.tick() {
            progress.fraction(phase::PROPERTIES, done + 1, total);
        }
    }
    progress.finish(phase::PROPERTIES);

    progress.start(phase::QUANTITIES);
    let mut quantities = QuantityTableBuilder::new(strings);
    let mut decoded: FxHashMap<EntityId, Option<QuantitySet>> = FxHashMap::default();
    let total = maps.quantity_sets.len();
    for (done, (element, sets)) in sorted(&maps.quantity_sets).into_iter().enumerate() {
        for set_id in sets {
            let set = decoded
                .entry(*set_id)
                .or_insert_with(|| decoder.quantity_set(*set_id));
            if let Some(set) = set {
                quantities.add_set(element, set);
            }
        }
        if yield_point.tick() {
            progress.fraction(phase::QUANTITIES, done + 1, total);
        }
    }
    progress.finish(phase::QUANTITIES);

    log::debug!(
        "materialized {} property rows and {} quantity rows",
        properties.len(),
        quantities.len()
    );
    (properties.build(), quantities.build())
}

/// Map entries in element id order, so table rows are deterministic
fn sorted(map: &FxHashMap<EntityId, Vec<EntityId>>) -> Vec<(EntityId, &Vec<EntityId>)> {
    let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, v)).collect();
    entries.sort_by_key(|(k, _)| *k);
    entries
}

/// Elements a defining set applies to
pub fn elements_defined_by(graph: &RelationshipGraph, set: EntityId) -> Vec<EntityId> {
    graph.related(set, RelationshipType::DefinesByProperties, Direction::Forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EntityIndex;
    use crate::relationships::extract_relationships;

    const DATA: &str = "DATA;
#1=IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);
#10=IFCWALL('w1',$,'Wall-01',$,$,$,$,$);
#11=IFCWALL('w2',$,'Wall-02',$,$,$,$,$);
#20=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('2HR'),$);
#21=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);
#22=IFCPROPERTYSINGLEVALUE('Width',$,IFCLENGTHMEASURE(200.),#1);
#23=IFCPROPERTYENUMERATEDVALUE('Status',$,(IFCLABEL('New')),$);
#24=IFCPROPERTYBOUNDEDVALUE('Range',$,IFCREAL(10.),IFCREAL(2.),$,$);
#30=IFCPROPERTYSET('ps',$,'Pset_WallCommon',$,(#20,#21,#22,#23,#24));
#40=IFCQUANTITYLENGTH('Length',$,$,5.,$);
#41=IFCQUANTITYVOLUME('NetVolume',$,$,1.25,'L*W*H');
#50=IFCELEMENTQUANTITY('qs',$,'Qto_WallBaseQuantities',$,$,(#40,#41));
#60=IFCRELDEFINESBYPROPERTIES('r1',$,$,$,(#10,#11),#30);
#61=IFCRELDEFINESBYPROPERTIES('r2',$,$,$,(#10),#50);
";

    fn fixture() -> (Arc<EntityStore>, RelationshipGraph) {
        let strings = StringTable::shared();
        let index = EntityIndex::build(DATA.as_bytes(), &strings, &mut YieldPoint::disabled());
        let store = Arc::new(EntityStore::new(Arc::from(DATA.as_bytes()), index, strings));
        let graph =
            extract_relationships(&store, &ProgressReporter::silent(), &mut YieldPoint::disabled());
        (store, graph)
    }

    #[test]
    fn test_on_demand_reader() {
        let (store, graph) = fixture();
        let reader = OnDemandProperties::from_graph(Arc::clone(&store), &graph);

        let sets = reader.property_sets(EntityId(10));
        assert_eq!(sets.len(), 1);
        let pset = &sets[0];
        assert_eq!(pset.name, "Pset_WallCommon");
        assert_eq!(pset.id, Some(EntityId(30)));
        assert_eq!(
            pset.get("FireRating").map(|p| &p.value),
            Some(&PropertyValue::Text("2HR".into()))
        );
        assert_eq!(
            pset.get("IsExternal").map(|p| &p.value),
            Some(&PropertyValue::Boolean(true))
        );
        assert_eq!(pset.get("Width").and_then(|p| p.unit.as_deref()), Some("mm"));
        assert_eq!(
            pset.get("Status").map(|p| &p.value),
            Some(&PropertyValue::Text("New".into()))
        );
        assert_eq!(
            pset.get("Range").map(|p| p.value.to_string()),
            Some("2 - 10".to_string())
        );

        let qsets = reader.quantity_sets(EntityId(10));
        assert_eq!(qsets[0].quantities.len(), 2);
        assert_eq!(qsets[0].get("NetVolume").and_then(|q| q.formula.as_deref()), Some("L*W*H"));
        assert!(reader.quantity_sets(EntityId(11)).is_empty());
        assert_eq!(elements_defined_by(&graph, EntityId(30)), vec![EntityId(10), EntityId(11)]);
    }

    #[test]
    fn test_materialize_decodes_shared_sets_for_each_element() {
        let (store, graph) = fixture();
        let maps = DefinitionMaps::from_graph(&graph, store.as_ref());
        let (properties, quantities) = materialize(
            &store,
            &maps,
            Arc::clone(store.strings()),
            &ProgressReporter::silent(),
            &mut YieldPoint::disabled(),
        );

        assert_eq!(properties.len(), 10);
        assert_eq!(properties.get_for_entity(EntityId(11))[0].properties.len(), 5);
        assert_eq!(quantities.sum_by_type("NetVolume"), 1.25);
        assert_eq!(quantities.get_for_entity(EntityId(10))[0].name, "Qto_WallBaseQuantities");
    }
}
