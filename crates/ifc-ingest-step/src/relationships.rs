// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relationship extraction from objectified IfcRel* records

use crate::store::EntityStore;
use ifc_ingest_model::{
    phase, EntityId, EntityResolver, IfcType, ProgressReporter, RelationshipGraph,
    RelationshipGraphBuilder, RelationshipType, YieldPoint,
};

/// Attribute positions of the relating (source) and related (target) sides
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationshipLayout {
    pub source: usize,
    pub target: usize,
}

/// Per-type attribute layout of the mapped relationship types
pub fn layout(rel_type: RelationshipType) -> RelationshipLayout {
    let (source, target) = match rel_type {
        // RelatedElements(4), RelatingStructure(5)
        RelationshipType::ContainsElements => (5, 4),
        // RelatingObject(4), RelatedObjects(5)
        RelationshipType::Aggregates => (4, 5),
        // RelatedObjects(4), Relating...(5)
        RelationshipType::DefinesByProperties
        | RelationshipType::DefinesByType
        | RelationshipType::AssociatesMaterial
        | RelationshipType::AssociatesClassification => (5, 4),
        // RelatingBuildingElement(4), RelatedOpeningElement(5)
        RelationshipType::VoidsElement => (4, 5),
        // RelatingOpeningElement(4), RelatedBuildingElement(5)
        RelationshipType::FillsElement => (4, 5),
        // ConnectionGeometry(4), RelatingElement(5), RelatedElement(6)
        RelationshipType::ConnectsPathElements => (5, 6),
        // RelatingSpace(4), RelatedBuildingElement(5)
        RelationshipType::SpaceBoundary => (4, 5),
    };
    RelationshipLayout { source, target }
}

/// Relationship entity types that map onto graph edges
pub const MAPPED_TYPES: [IfcType; 10] = [
    IfcType::IfcRelContainedInSpatialStructure,
    IfcType::IfcRelAggregates,
    IfcType::IfcRelDefinesByProperties,
    IfcType::IfcRelDefinesByType,
    IfcType::IfcRelAssociatesMaterial,
    IfcType::IfcRelAssociatesClassification,
    IfcType::IfcRelVoidsElement,
    IfcType::IfcRelFillsElement,
    IfcType::IfcRelConnectsPathElements,
    IfcType::IfcRelSpaceBoundary,
];

/// Parse every mapped relationship record and build the graph
///
/// Relationship types outside [`MAPPED_TYPES`] are not parsed at all.
pub fn extract_relationships(
    store: &EntityStore,
    progress: &ProgressReporter<'_>,
    yield_point: &mut YieldPoint,
) -> RelationshipGraph {
    progress.start(phase::RELATIONSHIPS);

    let work: Vec<(RelationshipType, Vec<EntityId>)> = MAPPED_TYPES
        .iter()
        .filter_map(|ty| {
            let rel_type = RelationshipType::from_ifc_type(ty)?;
            Some((rel_type, store.ids_by_type(ty)))
        })
        .collect();
    let total: usize = work.iter().map(|(_, ids)| ids.len()).sum();

    let mut builder = RelationshipGraphBuilder::new();
    let mut done = 0;
    let mut skipped = 0;

    for (rel_type, ids) in work {
        let RelationshipLayout { source, target } = layout(rel_type);
        for rel_id in ids {
            done += 1;
            if yield_point.tick() {
                progress.fraction(phase::RELATIONSHIPS, done, total);
            }

            let Some(rel) = store.get(rel_id) else {
                skipped += 1;
                continue;
            };

            let targets = rel.get_refs(target);
            for from in rel.get_refs(source) {
                builder.add_fan_out(from, &targets, rel_type, Some(rel_id));
            }
        }
    }

    if skipped > 0 {
        log::warn!("{} relationship records could not be parsed", skipped);
    }
    log::debug!("relationships: {} records, {} edges", total, builder.len());

    progress.finish(phase::RELATIONSHIPS);
    builder.build()
}
