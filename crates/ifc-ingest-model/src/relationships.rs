// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed relationship graph with forward and backward adjacency

use crate::{EntityId, IfcType};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Relationship kinds kept in the graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    ContainsElements,
    Aggregates,
    DefinesByProperties,
    DefinesByType,
    AssociatesMaterial,
    AssociatesClassification,
    VoidsElement,
    FillsElement,
    ConnectsPathElements,
    SpaceBoundary,
}

impl RelationshipType {
    /// Map an objectified relationship entity type; unmapped types are dropped
    pub fn from_ifc_type(ifc_type: &IfcType) -> Option<Self> {
        Some(match ifc_type {
            IfcType::IfcRelContainedInSpatialStructure => RelationshipType::ContainsElements,
            IfcType::IfcRelAggregates => RelationshipType::Aggregates,
            IfcType::IfcRelDefinesByProperties => RelationshipType::DefinesByProperties,
            IfcType::IfcRelDefinesByType => RelationshipType::DefinesByType,
            IfcType::IfcRelAssociatesMaterial => RelationshipType::AssociatesMaterial,
            IfcType::IfcRelAssociatesClassification => {
                RelationshipType::AssociatesClassification
            }
            IfcType::IfcRelVoidsElement => RelationshipType::VoidsElement,
            IfcType::IfcRelFillsElement => RelationshipType::FillsElement,
            IfcType::IfcRelConnectsPathElements => RelationshipType::ConnectsPathElements,
            IfcType::IfcRelSpaceBoundary => RelationshipType::SpaceBoundary,
            _ => return None,
        })
    }

    /// Edge type for a parent/child declaration that carries no relationship entity
    ///
    /// Two spatial containers (project, site, building, storey, space) form
    /// an aggregation; every other pair is containment.
    pub fn infer_from_parent_child(parent: &IfcType, child: &IfcType) -> Self {
        if parent.is_spatial_container() && child.is_spatial_container() {
            RelationshipType::Aggregates
        } else {
            RelationshipType::ContainsElements
        }
    }
}

/// Direction of traversal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// From relating (source) to related (target)
    Forward,
    /// From related (target) back to relating (source)
    Inverse,
}

/// One directed edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: EntityId,
    pub target: EntityId,
    pub rel_type: RelationshipType,
    /// Relationship entity the edge came from, if any
    pub rel_id: Option<EntityId>,
}

/// Accumulates edges
#[derive(Default)]
pub struct RelationshipGraphBuilder {
    edges: Vec<Edge>,
}

impl RelationshipGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(
        &mut self,
        source: EntityId,
        target: EntityId,
        rel_type: RelationshipType,
        rel_id: Option<EntityId>,
    ) {
        self.edges.push(Edge {
            source,
            target,
            rel_type,
            rel_id,
        });
    }

    /// One edge from `source` to each target
    pub fn add_fan_out(
        &mut self,
        source: EntityId,
        targets: &[EntityId],
        rel_type: RelationshipType,
        rel_id: Option<EntityId>,
    ) {
        for &target in targets {
            self.add_edge(source, target, rel_type, rel_id);
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn build(self) -> RelationshipGraph {
        let mut forward: FxHashMap<EntityId, Vec<u32>> = FxHashMap::default();
        let mut backward: FxHashMap<EntityId, Vec<u32>> = FxHashMap::default();

        for (i, edge) in self.edges.iter().enumerate() {
            forward.entry(edge.source).or_default().push(i as u32);
            backward.entry(edge.target).or_default().push(i as u32);
        }

        RelationshipGraph {
            edges: self.edges,
            forward,
            backward,
        }
    }
}

/// Immutable relationship graph
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    edges: Vec<Edge>,
    forward: FxHashMap<EntityId, Vec<u32>>,
    backward: FxHashMap<EntityId, Vec<u32>>,
}

impl RelationshipGraph {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_from(&self, id: EntityId) -> impl Iterator<Item = &Edge> + '_ {
        self.forward
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i as usize])
    }

    pub fn edges_to(&self, id: EntityId) -> impl Iterator<Item = &Edge> + '_ {
        self.backward
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i as usize])
    }

    /// Entities on the other end of `rel_type` edges touching `id`
    pub fn related(
        &self,
        id: EntityId,
        rel_type: RelationshipType,
        direction: Direction,
    ) -> Vec<EntityId> {
        match direction {
            Direction::Forward => self
                .edges_from(id)
                .filter(|e| e.rel_type == rel_type)
                .map(|e| e.target)
                .collect(),
            Direction::Inverse => self
                .edges_to(id)
                .filter(|e| e.rel_type == rel_type)
                .map(|e| e.source)
                .collect(),
        }
    }

    pub fn edges_of_type(&self, rel_type: RelationshipType) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.rel_type == rel_type)
    }

    /// Edge count per relationship type
    pub fn type_counts(&self) -> FxHashMap<RelationshipType, usize> {
        let mut counts = FxHashMap::default();
        for edge in &self.edges {
            *counts.entry(edge.rel_type).or_insert(0) += 1;
        }
        counts
    }
}
