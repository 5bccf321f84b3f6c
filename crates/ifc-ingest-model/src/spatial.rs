// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial structure: Project → Site → Building → Storey → Elements

use crate::{
    Direction, EntityId, EntityTable, HierarchyError, IfcType, RelationshipGraph,
    RelationshipType,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Type of spatial structure node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialNodeType {
    Project,
    Site,
    Building,
    Storey,
    Space,
    /// Building element (wall, door, etc.)
    Element,
    /// IFC4x3 facility (road, bridge, etc.)
    Facility,
    FacilityPart,
}

impl SpatialNodeType {
    pub fn display_name(&self) -> &'static str {
        match self {
            SpatialNodeType::Project => "Project",
            SpatialNodeType::Site => "Site",
            SpatialNodeType::Building => "Building",
            SpatialNodeType::Storey => "Storey",
            SpatialNodeType::Space => "Space",
            SpatialNodeType::Element => "Element",
            SpatialNodeType::Facility => "Facility",
            SpatialNodeType::FacilityPart => "Facility Part",
        }
    }

    pub fn from_ifc_type(ifc_type: &IfcType) -> Self {
        match ifc_type {
            IfcType::IfcProject => SpatialNodeType::Project,
            IfcType::IfcSite => SpatialNodeType::Site,
            IfcType::IfcBuilding => SpatialNodeType::Building,
            IfcType::IfcBuildingStorey => SpatialNodeType::Storey,
            IfcType::IfcSpace => SpatialNodeType::Space,
            IfcType::IfcFacility => SpatialNodeType::Facility,
            IfcType::IfcFacilityPart => SpatialNodeType::FacilityPart,
            _ => SpatialNodeType::Element,
        }
    }
}

/// Node in the spatial hierarchy tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialNode {
    pub id: EntityId,
    pub node_type: SpatialNodeType,
    pub name: String,
    /// Upper-case entity type name (e.g. "IFCWALL")
    pub entity_type: String,
    /// Elevation (storeys only)
    pub elevation: Option<f64>,
    pub children: Vec<SpatialNode>,
    pub has_geometry: bool,
}

impl SpatialNode {
    pub fn new(
        id: EntityId,
        node_type: SpatialNodeType,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            node_type,
            name: name.into(),
            entity_type: entity_type.into(),
            elevation: None,
            children: Vec::new(),
            has_geometry: false,
        }
    }

    pub fn add_child(&mut self, child: SpatialNode) {
        self.children.push(child);
    }

    /// Total element count (recursive)
    pub fn element_count(&self) -> usize {
        self.iter()
            .filter(|n| n.node_type == SpatialNodeType::Element)
            .count()
    }

    pub fn find(&self, id: EntityId) -> Option<&SpatialNode> {
        self.iter().find(|n| n.id == id)
    }

    /// Iterate all nodes (depth-first, pre-order)
    pub fn iter(&self) -> SpatialNodeIter<'_> {
        SpatialNodeIter { stack: vec![self] }
    }

    pub fn element_ids(&self) -> Vec<EntityId> {
        self.iter()
            .filter(|n| n.node_type == SpatialNodeType::Element)
            .map(|n| n.id)
            .collect()
    }
}

/// Iterator over spatial nodes (depth-first)
pub struct SpatialNodeIter<'a> {
    stack: Vec<&'a SpatialNode>,
}

impl<'a> Iterator for SpatialNodeIter<'a> {
    type Item = &'a SpatialNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Reverse so the first child comes out first
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Building storey summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreyInfo {
    pub id: EntityId,
    pub name: String,
    pub elevation: Option<f64>,
    /// Distance to the next storey up, when both elevations are known
    pub height: Option<f64>,
    pub element_count: usize,
}

/// Spatial tree plus reverse lookups
///
/// `element_to_storey` is the exact inverse of `by_storey`: an element
/// appears under at most one storey, the first one that contains it.
#[derive(Clone, Debug, Default)]
pub struct SpatialHierarchy {
    pub project: Option<SpatialNode>,
    pub by_storey: FxHashMap<EntityId, Vec<EntityId>>,
    pub by_building: FxHashMap<EntityId, Vec<EntityId>>,
    pub by_site: FxHashMap<EntityId, Vec<EntityId>>,
    pub element_to_storey: FxHashMap<EntityId, EntityId>,
    pub storey_elevations: FxHashMap<EntityId, f64>,
    pub storey_heights: FxHashMap<EntityId, f64>,
    /// Storeys in tree order
    storeys: Vec<EntityId>,
}

impl SpatialHierarchy {
    pub fn root(&self) -> Option<&SpatialNode> {
        self.project.as_ref()
    }

    pub fn elements_in_storey(&self, storey: EntityId) -> &[EntityId] {
        self.by_storey
            .get(&storey)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn containing_storey(&self, element: EntityId) -> Option<EntityId> {
        self.element_to_storey.get(&element).copied()
    }

    pub fn elements_in_building(&self, building: EntityId) -> &[EntityId] {
        self.by_building
            .get(&building)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn elements_in_site(&self, site: EntityId) -> &[EntityId] {
        self.by_site.get(&site).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, id: EntityId) -> Option<&SpatialNode> {
        self.project.as_ref()?.find(id)
    }

    /// Storeys sorted by elevation; storeys without one keep tree order at the end
    pub fn storeys(&self) -> Vec<StoreyInfo> {
        let mut storeys: Vec<StoreyInfo> = self
            .storeys
            .iter()
            .map(|&id| StoreyInfo {
                id,
                name: self.find(id).map(|n| n.name.clone()).unwrap_or_default(),
                elevation: self.storey_elevations.get(&id).copied(),
                height: self.storey_heights.get(&id).copied(),
                element_count: self.elements_in_storey(id).len(),
            })
            .collect();

        storeys.sort_by(|a, b| match (a.elevation, b.elevation) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        storeys
    }

    /// Whether `by_storey` and `element_to_storey` mirror each other
    pub fn is_consistent(&self) -> bool {
        let forward: usize = self.by_storey.values().map(Vec::len).sum();
        forward == self.element_to_storey.len()
            && self.by_storey.iter().all(|(storey, elements)| {
                elements
                    .iter()
                    .all(|e| self.element_to_storey.get(e) == Some(storey))
            })
    }
}

/// Elevation lookup for a storey id
pub type ElevationFn<'a> = &'a dyn Fn(EntityId) -> Option<f64>;

/// Builds a [`SpatialHierarchy`] from the entity table and relationship graph
///
/// Starts at the project, follows `Aggregates` edges through the spatial
/// structure and `ContainsElements` edges from each spatial node down to
/// elements. Elements aggregated by an element (stair flights, roof slabs)
/// inherit the placement of their parent.
pub struct SpatialHierarchyBuilder<'a> {
    entities: &'a EntityTable,
    graph: &'a RelationshipGraph,
    elevation: Option<ElevationFn<'a>>,
    root: Option<EntityId>,
}

#[derive(Clone, Copy, Default)]
struct Placement {
    site: Option<EntityId>,
    building: Option<EntityId>,
    storey: Option<EntityId>,
}

impl<'a> SpatialHierarchyBuilder<'a> {
    pub fn new(entities: &'a EntityTable, graph: &'a RelationshipGraph) -> Self {
        Self {
            entities,
            graph,
            elevation: None,
            root: None,
        }
    }

    pub fn with_elevation(mut self, elevation: ElevationFn<'a>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Start from a specific spatial entity instead of the project
    pub fn with_root(mut self, root: EntityId) -> Self {
        self.root = Some(root);
        self
    }

    pub fn build(self) -> Result<SpatialHierarchy, HierarchyError> {
        let root = match self.root {
            Some(root) => root,
            None => {
                let projects = self.entities.ids_by_type(IfcType::IfcProject.name());
                let first = *projects.first().ok_or(HierarchyError::MissingProject)?;
                if projects.len() > 1 {
                    log::warn!(
                        "{} projects found; building hierarchy from {}",
                        projects.len(),
                        first
                    );
                }
                first
            }
        };

        let root_type = self.entities.get_ifc_type(root).unwrap_or_default();
        if !root_type.is_spatial() {
            return Err(HierarchyError::NotSpatial(root));
        }

        let mut walk = Walk {
            entities: self.entities,
            graph: self.graph,
            elevation: self.elevation,
            visiting: FxHashSet::default(),
            placed: FxHashSet::default(),
            hierarchy: SpatialHierarchy::default(),
        };

        let project = walk.spatial(root, Placement::default())?;
        let mut hierarchy = walk.hierarchy;
        hierarchy.project = project;
        hierarchy.storey_heights = storey_heights(&hierarchy.storey_elevations);

        log::debug!(
            "spatial hierarchy: {} storeys, {} contained elements",
            hierarchy.storeys.len(),
            hierarchy.element_to_storey.len()
        );
        Ok(hierarchy)
    }
}

/// Height of each storey: distance to the next elevation up
fn storey_heights(elevations: &FxHashMap<EntityId, f64>) -> FxHashMap<EntityId, f64> {
    let mut sorted: Vec<(EntityId, f64)> = elevations.iter().map(|(k, v)| (*k, *v)).collect();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    sorted
        .windows(2)
        .map(|pair| (pair[0].0, pair[1].1 - pair[0].1))
        .collect()
}

struct Walk<'a> {
    entities: &'a EntityTable,
    graph: &'a RelationshipGraph,
    elevation: Option<ElevationFn<'a>>,
    /// Spatial ancestors of the node being built
    visiting: FxHashSet<EntityId>,
    placed: FxHashSet<EntityId>,
    hierarchy: SpatialHierarchy,
}

impl Walk<'_> {
    fn node(&self, id: EntityId, node_type: SpatialNodeType) -> SpatialNode {
        let mut node = SpatialNode::new(
            id,
            node_type,
            self.entities.get_name(id).as_deref().unwrap_or(""),
            self.entities.get_type_name(id).as_deref().unwrap_or(""),
        );
        node.has_geometry = self.entities.has_geometry(id);
        node
    }

    fn children(&self, id: EntityId) -> Vec<EntityId> {
        let mut children = self
            .graph
            .related(id, RelationshipType::Aggregates, Direction::Forward);
        children.extend(
            self.graph
                .related(id, RelationshipType::ContainsElements, Direction::Forward),
        );
        children
    }

    fn is_spatial(&self, id: EntityId) -> bool {
        self.entities
            .get_ifc_type(id)
            .is_some_and(|ty| ty.is_spatial())
    }

    fn spatial(
        &mut self,
        id: EntityId,
        mut placement: Placement,
    ) -> Result<Option<SpatialNode>, HierarchyError> {
        if self.visiting.contains(&id) {
            return Err(HierarchyError::CyclicAggregation(id));
        }
        if !self.placed.insert(id) {
            log::debug!("{} aggregated more than once; keeping first placement", id);
            return Ok(None);
        }
        self.visiting.insert(id);

        let ifc_type = self.entities.get_ifc_type(id).unwrap_or_default();
        let node_type = SpatialNodeType::from_ifc_type(&ifc_type);
        let mut node = self.node(id, node_type);

        match node_type {
            SpatialNodeType::Site => placement.site = Some(id),
            SpatialNodeType::Building | SpatialNodeType::Facility => placement.building = Some(id),
            SpatialNodeType::Storey => {
                placement.storey = Some(id);
                self.hierarchy.storeys.push(id);
                node.elevation = self.elevation.and_then(|lookup| lookup(id));
                if let Some(elevation) = node.elevation {
                    self.hierarchy.storey_elevations.insert(id, elevation);
                }
            }
            _ => {}
        }

        for child in self.children(id) {
            let child = if self.is_spatial(child) {
                self.spatial(child, placement)?
            } else {
                self.element(child, placement)
            };
            if let Some(child) = child {
                node.add_child(child);
            }
        }

        self.visiting.remove(&id);
        Ok(Some(node))
    }

    fn element(&mut self, id: EntityId, placement: Placement) -> Option<SpatialNode> {
        // First containment wins
        if !self.placed.insert(id) {
            return None;
        }

        let hierarchy = &mut self.hierarchy;
        if let Some(storey) = placement.storey {
            hierarchy.by_storey.entry(storey).or_default().push(id);
            hierarchy.element_to_storey.insert(id, storey);
        }
        if let Some(building) = placement.building {
            hierarchy.by_building.entry(building).or_default().push(id);
        }
        if let Some(site) = placement.site {
            hierarchy.by_site.entry(site).or_default().push(id);
        }

        let mut node = self.node(id, SpatialNodeType::Element);
        for part in self
            .graph
            .related(id, RelationshipType::Aggregates, Direction::Forward)
        {
            if let Some(part) = self.element(part, placement) {
                node.add_child(part);
            }
        }
        Some(node)
    }
}
