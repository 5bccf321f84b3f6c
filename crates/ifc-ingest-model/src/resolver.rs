// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity resolution trait used for on-demand attribute access

use crate::{AttributeValue, DecodedEntity, EntityId, IfcType};
use std::sync::Arc;

/// Entity lookup and reference resolution
///
/// Implemented by the STEP entity store, which parses a record the first
/// time it is requested and serves the cached result afterwards. Tables
/// hold an `Arc<dyn EntityResolver>` to fill deferred columns.
///
/// # Example
///
/// ```ignore
/// use ifc_ingest_model::{EntityResolver, EntityId};
///
/// fn placement_of(resolver: &dyn EntityResolver, wall: EntityId) {
///     if let Some(wall) = resolver.get(wall) {
///         if let Some(placement) = wall.get(5).and_then(|a| resolver.resolve_ref(a)) {
///             println!("placement: {}", placement.ifc_type);
///         }
///     }
/// }
/// ```
pub trait EntityResolver: Send + Sync {
    /// Get the decoded entity, parsing it on first access
    fn get(&self, id: EntityId) -> Option<Arc<DecodedEntity>>;

    /// Resolve an attribute holding a single entity reference
    fn resolve_ref(&self, attr: &AttributeValue) -> Option<Arc<DecodedEntity>> {
        match attr {
            AttributeValue::EntityRef(id) => self.get(*id),
            _ => None,
        }
    }

    /// Resolve an attribute holding a list of entity references
    fn resolve_ref_list(&self, attr: &AttributeValue) -> Vec<Arc<DecodedEntity>> {
        match attr {
            AttributeValue::List(items) => items
                .iter()
                .filter_map(|item| self.resolve_ref(item))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Ids of all entities of a type, in file order
    fn ids_by_type(&self, ifc_type: &IfcType) -> Vec<EntityId>;

    /// Type of an entity without decoding its attributes
    fn type_of(&self, id: EntityId) -> Option<IfcType>;

    fn entity_count(&self) -> usize;
}
