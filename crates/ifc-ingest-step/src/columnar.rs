// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP buffer to columnar store
//!
//! The pipeline runs in fixed phases:
//!
//! 1. scan the DATA section into an [`EntityIndex`]
//! 2. fill the entity table, parsing only spatial containers up front
//! 3. parse the mapped relationship records into the graph
//! 4. decode property and quantity sets, eagerly for small files and
//!    through [`OnDemandProperties`] above the configured threshold
//! 5. derive the spatial hierarchy
//!
//! Everything else stays unparsed until a consumer asks for it.

use crate::index::EntityIndex;
use crate::properties::{materialize, DefinitionMaps, OnDemandProperties};
use crate::relationships::extract_relationships;
use crate::scanner::{data_section_start, looks_like_step, parse_header};
use crate::store::EntityStore;
use crate::units::length_unit_scale;
use crate::StepParser;
use ifc_ingest_model::{
    phase, EntityId, EntityResolver, EntityRow, EntityTable, EntityTableBuilder, EntityText,
    FileFormat, IfcDataStore, IfcType, ParseError, PropertyReader, PropertyTable,
    ProgressReporter, QuantityTable, RelationshipGraph, Result, SpatialHierarchy,
    SpatialHierarchyBuilder, StringId, StringTable, YieldPoint,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;

/// IfcBuildingStorey.Elevation
const STOREY_ELEVATION_INDEX: usize = 9;

/// Per-type flags, computed once per distinct type name
#[derive(Clone, Copy)]
struct TypeTraits {
    spatial: bool,
    has_geometry: bool,
    is_type: bool,
}

impl TypeTraits {
    fn of(type_name: &str) -> Self {
        let ifc_type = IfcType::parse(type_name);
        Self {
            spatial: ifc_type.is_spatial_container(),
            has_geometry: ifc_type.has_geometry(),
            is_type: ifc_type.is_type_object(),
        }
    }
}

pub(crate) fn ingest(
    content: Arc<[u8]>,
    parser: &StepParser,
    progress: &ProgressReporter<'_>,
) -> Result<IfcDataStore> {
    let start = Instant::now();

    if !looks_like_step(&content) {
        return Err(ParseError::format("missing ISO-10303-21 signature"));
    }
    if data_section_start(&content).is_none() {
        return Err(ParseError::format("missing DATA section"));
    }

    let metadata = parse_header(&content);
    let mut yield_point = YieldPoint::new(parser.yield_interval, parser.yield_hook.clone());
    let strings = StringTable::shared();

    progress.start(phase::ENTITIES);
    let index = EntityIndex::build(&content, &strings, &mut yield_point);
    let scan_time = start.elapsed();
    let store = Arc::new(EntityStore::new(content, index, Arc::clone(&strings)));
    let table = entity_rows(&store, &strings, progress, &mut yield_point);
    progress.finish(phase::ENTITIES);
    log::debug!(
        "entities: {} records scanned in {:?}, {} parsed eagerly",
        store.len(),
        scan_time,
        store.parsed_count()
    );

    let relationships = extract_relationships(&store, progress, &mut yield_point);

    let (properties, quantities, on_demand) =
        property_tables(&store, &relationships, parser, progress, &mut yield_point);

    let length_unit_scale = length_unit_scale(store.as_ref());

    let resolver: Arc<dyn EntityResolver> = Arc::clone(&store) as Arc<dyn EntityResolver>;
    let entities = table.build(Some(resolver));

    let spatial_hierarchy = if parser.build_spatial_tree {
        spatial_hierarchy(&store, &entities, &relationships, length_unit_scale, progress)
    } else {
        None
    };

    let parse_time = start.elapsed();
    log::debug!(
        "parsed {} entities ({} edges, {} property rows) in {:?}",
        entities.count(),
        relationships.len(),
        properties.len(),
        parse_time
    );

    Ok(IfcDataStore {
        format: FileFormat::Step,
        schema_version: metadata.schema_version.clone(),
        metadata,
        entity_count: entities.count(),
        entities,
        properties,
        quantities,
        relationships,
        spatial_hierarchy,
        parse_time,
        length_unit_scale,
        on_demand,
    })
}

/// One row per indexed record, in file order
///
/// Spatial containers get their text columns now; every other row is
/// hydrated from the store on first access.
fn entity_rows(
    store: &EntityStore,
    strings: &StringTable,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
) -> EntityTableBuilder {
    let mut builder = EntityTableBuilder::with_capacity(Arc::clone(store.strings()), store.len());
    let mut traits: FxHashMap<StringId, TypeTraits> = FxHashMap::default();
    let total = store.len();

    for (done, entity_ref) in store.index().refs().iter().enumerate() {
        let flags = *traits.entry(entity_ref.type_name).or_insert_with(|| {
            strings
                .resolve(entity_ref.type_name)
                .map_or(TypeTraits::of(""), |name| TypeTraits::of(&name))
        });

        let decoded = if flags.spatial {
            store.get(EntityId(entity_ref.express_id))
        } else {
            None
        };

        builder.add(EntityRow {
            express_id: entity_ref.express_id,
            type_name: entity_ref.type_name,
            text: decoded.as_deref().map(EntityText::from_entity),
            has_geometry: flags.has_geometry,
            is_type: flags.is_type,
        });

        if yield_point.tick() {
            progress.fraction(phase::ENTITIES, done + 1, total);
        }
    }
    builder
}

type PropertyTables = (PropertyTable, QuantityTable, Option<Arc<dyn PropertyReader>>);

fn property_tables(
    store: &Arc<EntityStore>,
    graph: &RelationshipGraph,
    parser: &StepParser,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
) -> PropertyTables {
    let maps = DefinitionMaps::from_graph(graph, store.as_ref());

    if store.len() <= parser.eager_property_threshold {
        let (properties, quantities) =
            materialize(store, &maps, Arc::clone(store.strings()), progress, yield_point);
        return (properties, quantities, None);
    }

    log::debug!(
        "{} records exceed the eager threshold of {}, properties served on demand",
        store.len(),
        parser.eager_property_threshold
    );
    for name in [phase::PROPERTIES, phase::QUANTITIES] {
        progress.start(name);
        progress.finish(name);
    }
    let reader = OnDemandProperties::new(Arc::clone(store), maps);
    (
        PropertyTable::empty(),
        QuantityTable::empty(),
        Some(Arc::new(reader) as Arc<dyn PropertyReader>),
    )
}

fn spatial_hierarchy(
    store: &EntityStore,
    entities: &EntityTable,
    graph: &RelationshipGraph,
    unit_scale: f64,
    progress: &ProgressReporter<'_>,
) -> Option<SpatialHierarchy> {
    progress.start(phase::SPATIAL_HIERARCHY);

    // Elevations are reported in metres
    let elevation = |id: EntityId| {
        store
            .get(id)
            .and_then(|storey| storey.get_float(STOREY_ELEVATION_INDEX))
            .map(|value| value * unit_scale)
    };
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
