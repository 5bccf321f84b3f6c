// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for IFC data representation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type-safe entity identifier
///
/// Wraps the raw express id (e.g., #123 becomes EntityId(123)). IFCX
/// models get synthetic ids assigned by the composition pipeline.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize, Default)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        EntityId(id)
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

macro_rules! ifc_types {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// IFC entity type enumeration
        ///
        /// Covers the types the ingestion engine reasons about. Anything else
        /// is kept as `Unknown` with its upper-case STEP name.
        #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub enum IfcType {
            $($variant,)*
            /// Unknown type - stores the upper-case type name
            Unknown(String),
        }

        impl IfcType {
            /// Parse a type name (case-insensitive)
            pub fn parse(s: &str) -> Self {
                let upper = s.trim().to_ascii_uppercase();
                match upper.as_str() {
                    $($name => IfcType::$variant,)*
                    _ => IfcType::Unknown(upper),
                }
            }

            /// Upper-case STEP type name
            pub fn name(&self) -> &str {
                match self {
                    $(IfcType::$variant => $name,)*
                    IfcType::Unknown(s) => s,
                }
            }
        }
    };
}

ifc_types! {
    // Spatial structure
    IfcProject => "IFCPROJECT",
    IfcSite => "IFCSITE",
    IfcBuilding => "IFCBUILDING",
    IfcBuildingStorey => "IFCBUILDINGSTOREY",
    IfcSpace => "IFCSPACE",
    IfcFacility => "IFCFACILITY",
    IfcFacilityPart => "IFCFACILITYPART",

    // Building elements
    IfcWall => "IFCWALL",
    IfcWallStandardCase => "IFCWALLSTANDARDCASE",
    IfcCurtainWall => "IFCCURTAINWALL",
    IfcSlab => "IFCSLAB",
    IfcRoof => "IFCROOF",
    IfcBeam => "IFCBEAM",
    IfcColumn => "IFCCOLUMN",
    IfcDoor => "IFCDOOR",
    IfcWindow => "IFCWINDOW",
    IfcStair => "IFCSTAIR",
    IfcStairFlight => "IFCSTAIRFLIGHT",
    IfcRamp => "IFCRAMP",
    IfcRampFlight => "IFCRAMPFLIGHT",
    IfcRailing => "IFCRAILING",
    IfcCovering => "IFCCOVERING",
    IfcPlate => "IFCPLATE",
    IfcMember => "IFCMEMBER",
    IfcFooting => "IFCFOOTING",
    IfcPile => "IFCPILE",
    IfcBuildingElementProxy => "IFCBUILDINGELEMENTPROXY",
    IfcFurnishingElement => "IFCFURNISHINGELEMENT",
    IfcFurniture => "IFCFURNITURE",
    IfcDistributionElement => "IFCDISTRIBUTIONELEMENT",
    IfcFlowTerminal => "IFCFLOWTERMINAL",
    IfcFlowSegment => "IFCFLOWSEGMENT",
    IfcFlowFitting => "IFCFLOWFITTING",
    IfcOpeningElement => "IFCOPENINGELEMENT",

    // Representation
    IfcProductDefinitionShape => "IFCPRODUCTDEFINITIONSHAPE",

    // Relationships
    IfcRelContainedInSpatialStructure => "IFCRELCONTAINEDINSPATIALSTRUCTURE",
    IfcRelAggregates => "IFCRELAGGREGATES",
    IfcRelNests => "IFCRELNESTS",
    IfcRelDefinesByProperties => "IFCRELDEFINESBYPROPERTIES",
    IfcRelDefinesByType => "IFCRELDEFINESBYTYPE",
    IfcRelAssociatesMaterial => "IFCRELASSOCIATESMATERIAL",
    IfcRelAssociatesClassification => "IFCRELASSOCIATESCLASSIFICATION",
    IfcRelVoidsElement => "IFCRELVOIDSELEMENT",
    IfcRelFillsElement => "IFCRELFILLSELEMENT",
    IfcRelConnectsPathElements => "IFCRELCONNECTSPATHELEMENTS",
    IfcRelSpaceBoundary => "IFCRELSPACEBOUNDARY",

    // Properties and quantities
    IfcPropertySet => "IFCPROPERTYSET",
    IfcPropertySingleValue => "IFCPROPERTYSINGLEVALUE",
    IfcPropertyEnumeratedValue => "IFCPROPERTYENUMERATEDVALUE",
    IfcPropertyBoundedValue => "IFCPROPERTYBOUNDEDVALUE",
    IfcPropertyListValue => "IFCPROPERTYLISTVALUE",
    IfcElementQuantity => "IFCELEMENTQUANTITY",
    IfcQuantityLength => "IFCQUANTITYLENGTH",
    IfcQuantityArea => "IFCQUANTITYAREA",
    IfcQuantityVolume => "IFCQUANTITYVOLUME",
    IfcQuantityCount => "IFCQUANTITYCOUNT",
    IfcQuantityWeight => "IFCQUANTITYWEIGHT",
    IfcQuantityTime => "IFCQUANTITYTIME",

    // Materials and classification
    IfcMaterial => "IFCMATERIAL",
    IfcClassification => "IFCCLASSIFICATION",
    IfcClassificationReference => "IFCCLASSIFICATIONREFERENCE",

    // Units
    IfcUnitAssignment => "IFCUNITASSIGNMENT",
    IfcSIUnit => "IFCSIUNIT",
    IfcConversionBasedUnit => "IFCCONVERSIONBASEDUNIT",
    IfcMeasureWithUnit => "IFCMEASUREWITHUNIT",

    // Type objects
    IfcWallType => "IFCWALLTYPE",
    IfcSlabType => "IFCSLABTYPE",
    IfcBeamType => "IFCBEAMTYPE",
    IfcColumnType => "IFCCOLUMNTYPE",
    IfcDoorType => "IFCDOORTYPE",
    IfcWindowType => "IFCWINDOWTYPE",
    IfcCoveringType => "IFCCOVERINGTYPE",
    IfcMemberType => "IFCMEMBERTYPE",
    IfcPlateType => "IFCPLATETYPE",
    IfcBuildingElementProxyType => "IFCBUILDINGELEMENTPROXYTYPE",
}

impl FromStr for IfcType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl IfcType {
    /// Parse an IFCX class code such as `IfcWall` or `IfcBuildingStorey`
    pub fn from_class_code(code: &str) -> Self {
        Self::parse(code)
    }

    /// Check if this type represents a building element with potential geometry
    pub fn has_geometry(&self) -> bool {
        matches!(
            self,
            IfcType::IfcWall
                | IfcType::IfcWallStandardCase
                | IfcType::IfcCurtainWall
                | IfcType::IfcSlab
                | IfcType::IfcRoof
                | IfcType::IfcBeam
                | IfcType::IfcColumn
                | IfcType::IfcDoor
                | IfcType::IfcWindow
                | IfcType::IfcStair
                | IfcType::IfcStairFlight
                | IfcType::IfcRamp
                | IfcType::IfcRampFlight
                | IfcType::IfcRailing
                | IfcType::IfcCovering
                | IfcType::IfcPlate
                | IfcType::IfcMember
                | IfcType::IfcFooting
                | IfcType::IfcPile
                | IfcType::IfcBuildingElementProxy
                | IfcType::IfcFurnishingElement
                | IfcType::IfcFurniture
                | IfcType::IfcDistributionElement
                | IfcType::IfcFlowTerminal
                | IfcType::IfcFlowSegment
                | IfcType::IfcFlowFitting
                | IfcType::IfcOpeningElement
        )
    }

    /// Spatial containers: Project, Site, Building, BuildingStorey, Space
    pub fn is_spatial_container(&self) -> bool {
        matches!(
            self,
            IfcType::IfcProject
                | IfcType::IfcSite
                | IfcType::IfcBuilding
                | IfcType::IfcBuildingStorey
                | IfcType::IfcSpace
        )
    }

    /// Spatial containers plus IFC4x3 facilities
    pub fn is_spatial(&self) -> bool {
        self.is_spatial_container()
            || matches!(self, IfcType::IfcFacility | IfcType::IfcFacilityPart)
    }

    /// Objectified relationship (IFCREL*)
    pub fn is_relationship(&self) -> bool {
        self.name().starts_with("IFCREL")
    }

    /// Type objects and styles (IFCWALLTYPE, IFCDOORSTYLE, ...)
    pub fn is_type_object(&self) -> bool {
        let name = self.name();
        !self.is_relationship() && (name.ends_with("TYPE") || name.ends_with("STYLE"))
    }
}

impl Default for IfcType {
    fn default() -> Self {
        IfcType::Unknown(String::new())
    }
}

impl fmt::Display for IfcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded attribute value
///
/// Represents any value that can appear in an entity's attribute list.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum AttributeValue {
    /// Null value ($)
    #[default]
    Null,
    /// Derived value (*)
    Derived,
    /// Entity reference (#123)
    EntityRef(EntityId),
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value (escapes already decoded)
    String(String),
    /// Enumeration value (.VALUE.)
    Enum(String),
    /// List of values
    List(Vec<AttributeValue>),
    /// Typed value like IFCLABEL('text')
    TypedValue(String, Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_entity_ref(&self) -> Option<EntityId> {
        match self {
            AttributeValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// String content, looking through a typed wrapper
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::TypedValue(_, args) => args.first().and_then(|a| a.as_string()),
            _ => None,
        }
    }

    /// Numeric content; integers widen to f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::TypedValue(_, args) => args.first().and_then(|a| a.as_float()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::TypedValue(_, args) => args.first().and_then(|a| a.as_integer()),
            _ => None,
        }
    }

    /// Booleans, including the `.T.`/`.F.` enumeration spelling
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Enum(s) => match s.as_str() {
                "T" | "TRUE" => Some(true),
                "F" | "FALSE" => Some(false),
                _ => None,
            },
            AttributeValue::TypedValue(_, args) => args.first().and_then(|a| a.as_bool()),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            AttributeValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// Fully decoded entity record
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedEntity {
    pub id: EntityId,
    pub ifc_type: IfcType,
    /// Attribute values in declaration order
    pub attributes: Vec<AttributeValue>,
}

impl DecodedEntity {
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index)
    }

    pub fn get_ref(&self, index: usize) -> Option<EntityId> {
        self.get(index).and_then(|v| v.as_entity_ref())
    }

    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_string())
    }

    pub fn get_float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|v| v.as_float())
    }

    pub fn get_list(&self, index: usize) -> Option<&[AttributeValue]> {
        self.get(index).and_then(|v| v.as_list())
    }

    pub fn get_enum(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_enum())
    }

    /// Entity references at `index`, accepting either a single ref or a list
    pub fn get_refs(&self, index: usize) -> Vec<EntityId> {
        match self.get(index) {
            Some(AttributeValue::EntityRef(id)) => vec![*id],
            Some(AttributeValue::List(list)) => {
                list.iter().filter_map(|v| v.as_entity_ref()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Source wire format of a model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    /// ISO-10303-21 text ("IFC")
    Step,
    /// JSON entity-component layers ("IFCX")
    Ifcx,
}

/// Model metadata extracted from the file header
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Schema version (e.g., "IFC2X3", "IFC4", "ifcx_alpha")
    pub schema_version: String,
    pub originating_system: Option<String>,
    pub preprocessor_version: Option<String>,
    pub file_name: Option<String>,
    pub file_description: Option<String>,
    pub author: Option<String>,
    pub organization: Option<String>,
    pub timestamp: Option<String>,
}
