// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC Ingest Model - Shared columnar data model for IFC ingestion
//!
//! Both ingestion paths (STEP text files and layered IFCX JSON files) end up
//! in the same structures defined here, so downstream consumers never need
//! to know which wire format a model came from.
//!
//! # Architecture
//!
//! - [`StringTable`] - interned strings shared by the tables
//! - [`EntityTable`] - structure-of-arrays entity table with on-demand text
//! - [`PropertyTable`] / [`QuantityTable`] - columnar property and quantity rows
//! - [`RelationshipGraph`] - typed, directed edges with reverse adjacency
//! - [`SpatialHierarchy`] - Project → Site → Building → Storey → Element tree
//! - [`IfcDataStore`] - the bundle handed to consumers
//!
//! Tables are produced by builders (`add(...)` in any order, then `build()`)
//! and are immutable afterwards, apart from write-once caches that are
//! filled when a value is first requested.
//!
//! # Example
//!
//! ```ignore
//! use ifc_ingest_model::{EntityId, IfcDataStore};
//!
//! fn describe(store: &IfcDataStore, id: EntityId) {
//!     let name = store.entities.get_name(id).unwrap_or_default();
//!     println!("{} {}", store.entities.get_type_name(id).unwrap_or_default(), name);
//!     for pset in store.property_sets(id) {
//!         println!("  {} ({} properties)", pset.name, pset.properties.len());
//!     }
//! }
//! ```

pub mod entity_table;
pub mod error;
pub mod progress;
pub mod properties;
pub mod relationships;
pub mod resolver;
pub mod spatial;
pub mod store;
pub mod strings;
pub mod types;

pub use entity_table::*;
pub use error::*;
pub use progress::*;
pub use properties::*;
pub use relationships::*;
pub use resolver::*;
pub use spatial::*;
pub use store::*;
pub use strings::*;
pub use types::*;
