// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end ingestion of STEP and layered IFCX buffers

use ifc_ingest::model::{EntityId, FileFormat, StringTable, YieldPoint};
use ifc_ingest::step::{AttributeExtractor, EntityIndex};
use ifc_ingest::{IngestConfig, ParseError};
use std::sync::{Arc, Mutex};

const TOWER: &str = "ISO-10303-21;
HEADER;
FILE_NAME('tower.ifc','2024-05-01T10:00:00',('Ana'),('Studio'),'pre','Authoring 1.0','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('0proj',$,'Tower',$,$,$,$,$,$);
#10=IFCSITE('0site',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#11=IFCBUILDING('0bldg',$,'Main',$,$,$,$,$,.ELEMENT.,$,$,$);
#12=IFCBUILDINGSTOREY('0gf',$,'Ground',$,$,$,$,$,.ELEMENT.,0.);
#13=IFCBUILDINGSTOREY('0l1',$,'Level 1',$,$,$,$,$,.ELEMENT.,3.2);
#20=IFCWALL('ABC123',$,'Wall-01',$,$,$,$,$);
#21=IFCWALL('ABC124',$,'Wall-02',$,$,$,$,$);
#22=IFCSLAB('DEF456',$,'Slab-01',$,$,$,$,$,.FLOOR.);
#30=IFCRELAGGREGATES('r1',$,$,$,#1,(#10));
#31=IFCRELAGGREGATES('r2',$,$,$,#10,(#11));
#32=IFCRELAGGREGATES('r3',$,$,$,#11,(#12,#13));
#33=IFCRELCONTAINEDINSPATIALSTRUCTURE('r4',$,$,$,(#20,#21),#12);
#34=IFCRELCONTAINEDINSPATIALSTRUCTURE('r5',$,$,$,(#22),#13);
#40=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('2HR'),$);
#41=IFCPROPERTYSET('0pset',$,'Pset_WallCommon',$,(#40));
#42=IFCRELDEFINESBYPROPERTIES('r6',$,$,$,(#20,#21),#41);
ENDSEC;
END-ISO-10303-21;
";

const BASE: &str = r#"{
    "header": {"ifcxVersion": "ifcx_alpha", "author": "architect"},
    "data": [
        {"path": "p0", "children": {"Site": "s0"},
         "attributes": {"bsi::ifc::class": {"code": "IfcProject"}, "bsi::ifc::prop::Name": "Tower"}},
        {"path": "s0", "children": {"Building": "b0"},
         "attributes": {"bsi::ifc::class": {"code": "IfcSite"}}},
        {"path": "b0", "children": {"Ground": "st0"},
         "attributes": {"bsi::ifc::class": {"code": "IfcBuilding"}}},
        {"path": "st0", "children": {"Wall": "w0"},
         "attributes": {"bsi::ifc::class": {"code": "IfcBuildingStorey"},
                        "bsi::ifc::prop::Elevation": 0.0}},
        {"path": "w0", "inherits": {"Type": "wt0"},
         "attributes": {"bsi::ifc::class": {"code": "IfcWall"},
                        "bsi::ifc::prop::Name": "Base Wall",
                        "bsi::ifc::prop::Status": "NEW"}},
        {"path": "wt0", "attributes": {"bsi::ifc::prop::Status": "EXISTING",
                                       "bsi::ifc::prop::LoadBearing": true}}
    ]
}"#;

const FIRE: &str = r#"{
    "header": {"ifcxVersion": "ifcx_alpha", "author": "fire consultant"},
    "data": [
        {"path": "w0", "attributes": {"bsi::ifc::prop::FireRating": "2HR",
                                      "bsi::ifc::prop::Status": "REVIEWED"}},
        {"path": "st0", "children": {"Door": "d0"}},
        {"path": "d0", "attributes": {"bsi::ifc::class": {"code": "IfcDoor"}}}
    ]
}"#;

fn property(store: &ifc_ingest::IfcDataStore, id: EntityId, name: &str) -> Option<String> {
    store
        .property_sets(id)
        .iter()
        .find_map(|set| set.get(name))
        .map(|p| p.value.to_string())
}

#[test]
fn index_refs_round_trip_through_id_and_type() {
    let strings = StringTable::new();
    let index = EntityIndex::build(TOWER.as_bytes(), &strings, &mut YieldPoint::disabled());

    assert_eq!(index.len(), 16);
    for entity_ref in index.refs() {
        assert_eq!(index.get(entity_ref.express_id), Some(entity_ref));
        assert!(index
            .ids_of_type(entity_ref.type_name)
            .contains(&entity_ref.express_id));
    }
    let wall = strings.lookup("IFCWALL").unwrap();
    assert_eq!(index.ids_of_type(wall), &[20, 21]);
}

#[test]
fn extraction_is_idempotent() {
    let strings = StringTable::new();
    let index = EntityIndex::build(TOWER.as_bytes(), &strings, &mut YieldPoint::disabled());
    let extractor = AttributeExtractor::new(TOWER.as_bytes());

    for entity_ref in index.refs() {
        let first = extractor.extract(entity_ref).unwrap();
        let second = extractor.extract(entity_ref).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn single_wall_is_hydrated_on_request() {
    let data = "ISO-10303-21;\nDATA;\n#1=IFCWALL('ABC123',$,'Wall-01',$,$,$,$,$);\nENDSEC;\n";
    let store = ifc_ingest::parse(data.as_bytes()).unwrap();

    assert_eq!(store.format, FileFormat::Step);
    assert_eq!(store.entity_count, 1);
    assert!(!store.entities.is_hydrated(EntityId(1)));
    assert_eq!(store.entities.get_global_id(EntityId(1)).as_deref(), Some("ABC123"));
    assert_eq!(store.entities.get_name(EntityId(1)).as_deref(), Some("Wall-01"));
    assert!(store.entities.is_hydrated(EntityId(1)));
}

#[test]
fn step_hierarchy_mirrors_containment() {
    let store = ifc_ingest::parse(TOWER.as_bytes()).unwrap();
    let hierarchy = store.spatial_hierarchy.as_ref().unwrap();

    assert!(hierarchy.is_consistent());
    assert_eq!(hierarchy.elements_in_storey(EntityId(12)), &[EntityId(20), EntityId(21)]);
    for (&element, &storey) in &hierarchy.element_to_storey {
        assert!(hierarchy.elements_in_storey(storey).contains(&element));
    }
    let storeys = hierarchy.storeys();
    assert_eq!(storeys.len(), 2);
    assert_eq!(storeys[0].name, "Ground");
}

#[test]
fn eager_and_on_demand_properties_agree() {
    let eager = ifc_ingest::parse(TOWER.as_bytes()).unwrap();
    let lazy = ifc_ingest::parse_with_config(
        TOWER.as_bytes(),
        &IngestConfig {
            eager_property_threshold: 0,
            ..Default::default()
        },
    )
    .unwrap();

    assert!(!eager.has_on_demand_properties());
    assert!(lazy.has_on_demand_properties());
    for wall in [EntityId(20), EntityId(21)] {
        assert_eq!(property(&eager, wall, "FireRating").as_deref(), Some("2HR"));
        assert_eq!(eager.property_sets(wall), lazy.property_sets(wall));
    }
}

#[test]
fn overlay_wins_and_base_fills_the_rest() {
    let model = ifc_ingest::parse_federated(&[
        ("base.ifcx", BASE.as_bytes()),
        ("fire.ifcx", FIRE.as_bytes()),
    ])
    .unwrap();
    let wall = model.node("w0").unwrap();

    assert_eq!(wall.attribute_str("bsi::ifc::prop::Name"), Some("Base Wall"));
    assert_eq!(wall.attribute_str("bsi::ifc::prop::FireRating"), Some("2HR"));
    assert_eq!(wall.attribute_str("bsi::ifc::prop::Status"), Some("REVIEWED"));
    assert_eq!(wall.contributing_layers.len(), 2);

    let id = model.express_id_of("w0").unwrap();
    assert_eq!(property(&model.store, id, "Name").as_deref(), Some("Base Wall"));
    assert_eq!(property(&model.store, id, "FireRating").as_deref(), Some("2HR"));
    assert_eq!(model.store.metadata.author.as_deref(), Some("fire consultant"));
}

#[test]
fn disabling_the_overlay_falls_back_to_base() {
    let mut model = ifc_ingest::parse_federated(&[("base.ifcx", BASE.as_bytes())]).unwrap();
    let overlay = model.add_ifcx_overlay("fire.ifcx", FIRE.as_bytes()).unwrap();
    assert_eq!(
        model.node("w0").unwrap().attribute_str("bsi::ifc::prop::Status"),
        Some("REVIEWED")
    );

    model.set_layer_enabled(&overlay, false).unwrap();
    let wall = model.node("w0").unwrap();
    assert_eq!(wall.attribute_str("bsi::ifc::prop::Status"), Some("NEW"));
    assert!(wall.attribute("bsi::ifc::prop::FireRating").is_none());
    assert_eq!(model.store.metadata.author.as_deref(), Some("architect"));
}

#[test]
fn children_are_unioned_across_layers() {
    let model = ifc_ingest::parse_federated(&[
        ("base.ifcx", BASE.as_bytes()),
        ("fire.ifcx", FIRE.as_bytes()),
    ])
    .unwrap();
    let storey = model.node("st0").unwrap();

    let names: Vec<&str> = storey.children.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Door", "Wall"]);

    let hierarchy = model.store.spatial_hierarchy.as_ref().unwrap();
    let storey_id = model.express_id_of("st0").unwrap();
    assert_eq!(hierarchy.elements_in_storey(storey_id).len(), 2);
    assert!(hierarchy.is_consistent());
}

#[test]
fn paths_resolve_by_uuid_and_hierarchy() {
    let model = ifc_ingest::parse_federated(&[
        ("base.ifcx", BASE.as_bytes()),
        ("fire.ifcx", FIRE.as_bytes()),
    ])
    .unwrap();
    let index = model.path_index();

    assert_eq!(index.resolve_path("w0"), Some("w0"));
    assert_eq!(index.resolve_path("p0/Site"), Some("s0"));
    assert_eq!(index.resolve_path("p0/Site/Building/Ground/Door"), Some("d0"));
    assert_eq!(index.resolve_path("p0/Nowhere"), None);
    assert_eq!(index.resolve_path("missing"), None);
    assert_eq!(
        model.express_id_of("p0/Site/Building/Ground/Wall"),
        model.express_id_of("w0")
    );
}

#[test]
fn directly_declared_attributes_beat_inherited_ones() {
    let model = ifc_ingest::parse_federated(&[("base.ifcx", BASE.as_bytes())]).unwrap();
    let wall = model.node("w0").unwrap();

    assert_eq!(wall.attribute_str("bsi::ifc::prop::Status"), Some("NEW"));
    assert_eq!(
        wall.attribute("bsi::ifc::prop::LoadBearing"),
        Some(&serde_json::Value::Bool(true))
    );
    assert_eq!(model.composition_stats().inheritance_resolutions, 1);
}

#[test]
fn cyclic_inheritance_terminates_within_bound() {
    let cyclic = r#"{"header": {"ifcxVersion": "1"}, "data": [
        {"path": "a", "inherits": {"Next": "b"}, "attributes": {"A": 1}},
        {"path": "b", "inherits": {"Next": "c"}, "attributes": {"B": 2}},
        {"path": "c", "inherits": {"Next": "a"}, "attributes": {"C": 3}}
    ]}"#;
    let config = IngestConfig {
        max_inherit_depth: 1,
        ..Default::default()
    };

    let bounded =
        ifc_ingest::parse_federated_with_config(&[("cyclic.ifcx", cyclic.as_bytes())], &config)
            .unwrap();
    let a = bounded.node("a").unwrap();
    assert!(a.attribute("B").is_some());
    assert!(a.attribute("C").is_none());
    assert_eq!(bounded.composition_stats().inheritance_resolutions, 3);

    let full = ifc_ingest::parse_federated(&[("cyclic.ifcx", cyclic.as_bytes())]).unwrap();
    for path in ["a", "b", "c"] {
        assert_eq!(full.node(path).unwrap().attributes.len(), 3);
    }
    assert_eq!(full.composition_stats().inheritance_resolutions, 6);
}

#[test]
fn ifcx_progress_reports_compose_phases() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let store = ifc_ingest::parse_with_progress(
        BASE.as_bytes(),
        Box::new(move |phase: &str, percent: f32| {
            sink.lock().unwrap().push((phase.to_string(), percent));
        }),
    )
    .unwrap();

    assert_eq!(store.format, FileFormat::Ifcx);
    let seen = seen.lock().unwrap();
    for phase in ["compose-index", "compose-merge", "compose-inherit", "entities"] {
        assert!(seen.iter().any(|(p, pct)| p == phase && *pct == 0.0));
        assert!(seen.iter().any(|(p, pct)| p == phase && *pct == 100.0));
    }
}

#[test]
fn invalid_layers_are_reported_by_name() {
    let err = ifc_ingest::parse_federated(&[
        ("base.ifcx", BASE.as_bytes()),
        ("broken.ifcx", br#"{"data": [}"#.as_slice()),
    ])
    .unwrap_err();
    assert!(matches!(err, ParseError::InvalidIfcx { ref file, .. } if file == "broken.ifcx"));
}

#[test]
fn leading_schema_block_does_not_hide_ifcx() {
    let doc = format!(
        r#"{{
            "schemas": {{"example::doc": {{"value": {{"description": "{}"}}}}}},
            "header": {{"ifcxVersion": "ifcx_alpha"}},
            "data": [{{"path": "w", "attributes": {{"bsi::ifc::class": {{"code": "IfcWall"}}}}}}]
        }}"#,
        "long text ".repeat(500)
    );
    assert!(doc.find("ifcxVersion").unwrap() > 4096);

    assert_eq!(ifc_ingest::detect_format(doc.as_bytes()), Some(FileFormat::Ifcx));
    let store = ifc_ingest::parse(doc.as_bytes()).unwrap();
    assert_eq!(store.entity_count, 1);

    let model = ifc_ingest::parse_federated(&[("big.ifcx", doc.as_bytes())]).unwrap();
    assert_eq!(model.store.entity_count, 1);
    assert!(model.express_id_of("w").is_some());
}
