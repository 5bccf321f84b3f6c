// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composed IFCX nodes to columnar store
//!
//! Only nodes carrying an IFC class become entities. They are numbered
//! 1..N in path order so the same composition always yields the same ids.
//! Namespaced attributes become property rows (or quantity rows for
//! numeric `…::quantity::…` keys) and child declarations between two
//! entities become relationship edges.

use crate::composer::{ComposedNode, Composition};
use ifc_ingest_model::{
    phase, EntityId, EntityRow, EntityTable, EntityTableBuilder, EntityText, FileFormat,
    IfcDataStore, IfcType, ModelMetadata, Property, PropertyTable, PropertyTableBuilder,
    PropertyValue, ProgressReporter, Quantity, QuantityTable, QuantityTableBuilder,
    QuantityType, RelationshipGraph, RelationshipGraphBuilder, RelationshipType,
    SpatialHierarchy, SpatialHierarchyBuilder, StringTable, YieldPoint,
};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub const CLASS_KEY: &str = "bsi::ifc::class";
const PROP_NAMESPACE: &str = "bsi::ifc::prop::";
const GEOMETRY_PREFIX: &str = "usd::usdgeom";
const USD_PREFIX: &str = "usd::";
const PRESENTATION_PREFIX: &str = "bsi::ifc::presentation";
const QUANTITY_SUFFIX: &str = "::quantity";
/// Set name for attribute keys without a namespace
const PLAIN_SET_NAME: &str = "Attributes";

/// IFC class code of a node: `{"code": "IfcWall"}` or a bare string
pub fn class_code(node: &ComposedNode) -> Option<&str> {
    match node.attribute(CLASS_KEY)? {
        Value::Object(class) => class.get("code")?.as_str(),
        Value::String(code) => Some(code),
        _ => None,
    }
}

/// `bsi::ifc::prop::<name>`, falling back to the plain `<name>` key
fn prop_str<'a>(node: &'a ComposedNode, name: &str) -> Option<&'a str> {
    node.attribute_str(&format!("{}{}", PROP_NAMESPACE, name))
        .or_else(|| node.attribute_str(name))
}

fn prop_f64(node: &ComposedNode, name: &str) -> Option<f64> {
    node.attribute(&format!("{}{}", PROP_NAMESPACE, name))
        .or_else(|| node.attribute(name))?
        .as_f64()
}

/// Split `ns::set::name` into `("ns::set", "name")`
fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once("::").unwrap_or((PLAIN_SET_NAME, key))
}

fn is_structural(key: &str) -> bool {
    key == CLASS_KEY || key.starts_with(USD_PREFIX) || key.starts_with(PRESENTATION_PREFIX)
}

pub fn to_property_value(value: &Value) -> PropertyValue {
    match value {
        Value::Null => PropertyValue::Null,
        Value::Bool(b) => PropertyValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => PropertyValue::Integer(i),
            None => PropertyValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => PropertyValue::Text(s.clone()),
        Value::Array(items) => PropertyValue::List(items.iter().map(to_property_value).collect()),
        Value::Object(_) => PropertyValue::Text(value.to_string()),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExtractOptions {
    pub build_spatial_tree: bool,
}

/// Store plus the path ↔ express id mapping
#[derive(Debug)]
pub struct Extraction {
    pub store: IfcDataStore,
    pub path_to_express_id: FxHashMap<String, u32>,
    pub express_id_to_path: FxHashMap<u32, String>,
}

struct EntityNode<'a> {
    id: EntityId,
    ifc_type: IfcType,
    node: &'a ComposedNode,
}

pub fn extract(
    composition: &Composition,
    metadata: ModelMetadata,
    options: ExtractOptions,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
    started: Instant,
) -> Extraction {
    let strings = StringTable::shared();

    progress.start(phase::ENTITIES);
    let entity_nodes: Vec<EntityNode<'_>> = composition
        .nodes
        .values()
        .filter_map(|node| Some((node, class_code(node)?)))
        .enumerate()
        .map(|(i, (node, code))| EntityNode {
            id: EntityId(i as u32 + 1),
            ifc_type: IfcType::from_class_code(code),
            node,
        })
        .collect();

    let mut path_to_express_id = FxHashMap::default();
    let mut express_id_to_path = FxHashMap::default();
    let mut table = EntityTableBuilder::with_capacity(Arc::clone(&strings), entity_nodes.len());
    for (done, entity) in entity_nodes.iter().enumerate() {
        let node = entity.node;
        table.add(EntityRow {
            express_id: entity.id.0,
            type_name: strings.intern(entity.ifc_type.name()),
            text: Some(EntityText {
                global_id: &node.path,
                name: prop_str(node, "Name").unwrap_or(""),
                description: prop_str(node, "Description").unwrap_or(""),
                object_type: prop_str(node, "ObjectType").unwrap_or(""),
            }),
            has_geometry: node
                .attributes
                .keys()
                .any(|key| key.starts_with(GEOMETRY_PREFIX)),
            is_type: entity.ifc_type.is_type_object(),
        });
        path_to_express_id.insert(node.path.clone(), entity.id.0);
        express_id_to_path.insert(entity.id.0, node.path.clone());

        if yield_point.tick() {
            progress.fraction(phase::ENTITIES, done + 1, entity_nodes.len());
        }
    }
    let entities = table.build(None);
    progress.finish(phase::ENTITIES);

    let (properties, quantities) = property_rows(&entity_nodes, &strings, progress, yield_point);
    let relationships = relationship_edges(&entity_nodes, &path_to_express_id, progress);

    let spatial_hierarchy = if options.build_spatial_tree {
        spatial_hierarchy(&entity_nodes, &entities, &relationships, progress)
    } else {
        None
    };

    let parse_time = started.elapsed();
    log::debug!(
        "extracted {} entities from {} composed nodes in {:?}",
        entities.count(),
        composition.len(),
        parse_time
    );

    let store = IfcDataStore {
        format: FileFormat::Ifcx,
        schema_version: metadata.schema_version.clone(),
        metadata,
        entity_count: entities.count(),
        entities,
        properties,
        quantities,
        relationships,
        spatial_hierarchy,
        parse_time,
        length_unit_scale: 1.0,
        on_demand: None,
    };
    Extraction {
        store,
        path_to_express_id,
        express_id_to_path,
    }
}

fn property_rows(
    entity_nodes: &[EntityNode<'_>],
    strings: &Arc<StringTable>,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
) -> (PropertyTable, QuantityTable) {
    progress.start(phase::PROPERTIES);
    progress.start(phase::QUANTITIES);

    let mut properties = PropertyTableBuilder::new(Arc::clone(strings));
    let mut quantities = QuantityTableBuilder::new(Arc::clone(strings));
    for (done, entity) in entity_nodes.iter().enumerate() {
        for (key, value) in &entity.node.attributes {
            if is_structural(key) {
                continue;
            }
            let (set_name, name) = split_key(key);

            if set_name.ends_with(QUANTITY_SUFFIX) {
                if let Some(number) = value.as_f64() {
                    let quantity = Quantity::new(name, number, QuantityType::infer_from_name(name));
                    quantities.add(entity.id, None, set_name, &quantity);
                    continue;
                }
            }
            let property = Property::new(name, to_property_value(value));
            properties.add(entity.id, None, set_name, &property);
        }

        if yield_point.tick() {
            progress.fraction(phase::PROPERTIES, done + 1, entity_nodes.len());
        }
    }

    progress.finish(phase::PROPERTIES);
    progress.finish(phase::QUANTITIES);
    (properties.build(), quantities.build())
}

fn relationship_edges(
    entity_nodes: &[EntityNode<'_>],
    path_to_express_id: &FxHashMap<String, u32>,
    progress: &ProgressReporter<'_>,
) -> RelationshipGraph {
    progress.start(phase::RELATIONSHIPS);

    let types: FxHashMap<EntityId, &IfcType> = entity_nodes
        .iter()
        .map(|entity| (entity.id, &entity.ifc_type))
        .collect();

    let mut builder = RelationshipGraphBuilder::new();
    for parent in entity_nodes {
        for child_path in parent.node.children.values() {
            let Some(&child) = path_to_express_id.get(child_path) else {
                continue;
            };
            let child = EntityId(child);
            let Some(child_type) = types.get(&child) else {
                continue;
            };
            let rel_type = RelationshipType::infer_from_parent_child(&parent.ifc_type, child_type);
            builder.add_edge(parent.id, child, rel_type, None);
        }
    }

    progress.finish(phase::RELATIONSHIPS);
    builder.build()
}

fn spatial_hierarchy(
    entity_nodes: &[EntityNode<'_>],
    entities: &EntityTable,
    graph: &RelationshipGraph,
    progress: &ProgressReporter<'_>,
) -> Option<SpatialHierarchy> {
    progress.start(phase::SPATIAL_HIERARCHY);

    let elevations: FxHashMap<EntityId, f64> = entity_nodes
        .iter()
        .filter(|entity| entity.ifc_type == IfcType::IfcBuildingStorey)
        .filter_map(|entity| Some((entity.id, prop_f64(entity.node, "Elevation")?)))
        .collect();
    let elevation = |id: EntityId| elevations.get(&id).copied();

    let result = SpatialHierarchyBuilder::new(entities, graph)
        .with_elevation(&elevation)
        .build();

    progress.finish(phase::SPATIAL_HIERARCHY);
    match result {
        Ok(hierarchy) => Some(hierarchy),
        Err(e) => {
            log::warn!("spatial hierarchy unavailable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn node(path: &str, attributes: Value, children: &[(&str, &str)]) -> ComposedNode {
        let attributes: BTreeMap<String, Value> = serde_json::from_value(attributes).unwrap();
        ComposedNode {
            path: path.to_string(),
            attributes,
            children: children
                .iter()
                .map(|(name, target)| (name.to_string(), target.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn composition(nodes: Vec<ComposedNode>) -> Composition {
        Composition {
            nodes: nodes.into_iter().map(|n| (n.path.clone(), n)).collect(),
            ..Default::default()
        }
    }

    fn run(composition: &Composition) -> Extraction {
        extract(
            composition,
            ModelMetadata {
                schema_version: "ifcx_alpha".into(),
                ..Default::default()
            },
            ExtractOptions {
                build_spatial_tree: true,
            },
            &ProgressReporter::silent(),
            &mut YieldPoint::disabled(),
            Instant::now(),
        )
    }

    fn building() -> Composition {
        composition(vec![
            node(
                "p",
                json!({"bsi::ifc::class": {"code": "IfcProject"}, "bsi::ifc::prop::Name": "Demo"}),
                &[("Site", "s")],
            ),
            node("s", json!({"bsi::ifc::class": {"code": "IfcSite"}}), &[("B", "b")]),
            node("b", json!({"bsi::ifc::class": {"code": "IfcBuilding"}}), &[("L0", "st")]),
            node(
                "st",
                json!({"bsi::ifc::class": {"code": "IfcBuildingStorey"}, "bsi::ifc::prop::Elevation": 2.5}),
                &[("Wall", "w")],
            ),
            node(
                "w",
                json!({
                    "bsi::ifc::class": {"code": "IfcWall", "uri": "https://example.org/IfcWall"},
                    "bsi::ifc::prop::Name": "Wall-01",
                    "bsi::ifc::prop::FireRating": "2HR",
                    "bsi::ifc::prop::IsExternal": true,
                    "nlsfb::quantity::NetSideArea": 12.5,
                    "usd::usdgeom::mesh": {"points": []},
                    "Comment": "plain"
                }),
                &[("Body", "geom")],
            ),
            node("geom", json!({"usd::usdgeom::mesh": {"points": []}}), &[]),
        ])
    }

    #[test]
    fn test_only_classed_nodes_become_entities() {
        let extraction = run(&building());
        let store = &extraction.store;

        assert_eq!(store.format, FileFormat::Ifcx);
        assert_eq!(store.schema_version, "ifcx_alpha");
        assert_eq!(store.entity_count, 5);
        assert!(!extraction.path_to_express_id.contains_key("geom"));

        // path order: b, p, s, st, w
        assert_eq!(extraction.path_to_express_id["b"], 1);
        let wall = EntityId(extraction.path_to_express_id["w"]);
        assert_eq!(wall, EntityId(5));
        assert_eq!(extraction.express_id_to_path[&5], "w");
        assert_eq!(store.entities.get_type_name(wall).as_deref(), Some("IFCWALL"));
        assert_eq!(store.entities.get_global_id(wall).as_deref(), Some("w"));
        assert_eq!(store.entities.get_name(wall).as_deref(), Some("Wall-01"));
        assert!(store.entities.has_geometry(wall));
        assert!(!store.entities.has_geometry(EntityId(1)));
    }

    #[test]
    fn test_attributes_become_property_and_quantity_rows() {
        let extraction = run(&building());
        let store = &extraction.store;
        let wall = EntityId(5);

        let psets = store.property_sets(wall);
        let ifc = psets.iter().find(|s| s.name == "bsi::ifc::prop").unwrap();
        assert_eq!(ifc.get("FireRating").unwrap().value, PropertyValue::from("2HR"));
        assert_eq!(ifc.get("IsExternal").unwrap().value, PropertyValue::Boolean(true));
        let plain = psets.iter().find(|s| s.name == PLAIN_SET_NAME).unwrap();
        assert_eq!(plain.get("Comment").unwrap().value, PropertyValue::from("plain"));
        assert!(psets.iter().all(|s| s.get("mesh").is_none() && s.get("code").is_none()));

        let qsets = store.quantity_sets(wall);
        assert_eq!(qsets.len(), 1);
        assert_eq!(qsets[0].name, "nlsfb::quantity");
        let area = qsets[0].get("NetSideArea").unwrap();
        assert_eq!(area.quantity_type, QuantityType::Area);
        assert_eq!(store.quantities.sum_by_type("NetSideArea"), 12.5);
    }

    #[test]
    fn test_children_become_typed_edges_and_hierarchy() {
        let extraction = run(&building());
        let store = &extraction.store;
        let id = |path: &str| EntityId(extraction.path_to_express_id[path]);

        let aggregates = store.relationships.edges_of_type(RelationshipType::Aggregates);
        assert_eq!(aggregates.count(), 3);
        let contains: Vec<_> = store
            .relationships
            .edges_of_type(RelationshipType::ContainsElements)
            .collect();
        assert_eq!(contains.len(), 1);
        assert_eq!((contains[0].source, contains[0].target), (id("st"), id("w")));

        let hierarchy = store.spatial_hierarchy.as_ref().unwrap();
        assert_eq!(hierarchy.containing_storey(id("w")), Some(id("st")));
        assert_eq!(hierarchy.storey_elevations.get(&id("st")), Some(&2.5));
        assert!(hierarchy.is_consistent());
    }

    #[test]
    fn test_missing_project_skips_hierarchy() {
        let composition = composition(vec![node(
            "w",
            json!({"bsi::ifc::class": "IfcWall"}),
            &[],
        )]);
        let extraction = run(&composition);
        assert_eq!(extraction.store.entity_count, 1);
        assert!(extraction.store.spatial_hierarchy.is_none());
    }

    #[test]
    fn test_json_values_map_to_property_values() {
        assert_eq!(to_property_value(&json!(3)), PropertyValue::Integer(3));
        assert_eq!(to_property_value(&json!(0.5)), PropertyValue::Real(0.5));
        assert_eq!(
            to_property_value(&json!(["a", 1])),
            PropertyValue::List(vec![PropertyValue::from("a"), PropertyValue::Integer(1)])
        );
        assert_eq!(
            to_property_value(&json!({"k": 1})),
            PropertyValue::Text("{\"k\":1}".into())
        );
    }
}
