// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Length unit scale

use ifc_ingest_model::{DecodedEntity, EntityResolver, IfcType};

/// Factor converting the model's length unit to metres
///
/// Follows IFCPROJECT.UnitsInContext (8) to the unit assignment and picks
/// the first length unit. Returns 1.0 when the chain is incomplete.
pub fn length_unit_scale(resolver: &dyn EntityResolver) -> f64 {
    resolver
        .ids_by_type(&IfcType::IfcProject)
        .first()
        .and_then(|&project| resolver.get(project))
        .and_then(|project| resolver.get(project.get_ref(8)?))
        .and_then(|assignment| {
            assignment
                .get_refs(0)
                .into_iter()
                .filter_map(|unit| resolver.get(unit))
                .find_map(|unit| unit_scale(&unit, resolver, 0))
        })
        .unwrap_or(1.0)
}

/// Conversion-based units may nest; give up past this depth
const MAX_UNIT_DEPTH: usize = 4;

fn unit_scale(unit: &DecodedEntity, resolver: &dyn EntityResolver, depth: usize) -> Option<f64> {
    // UnitType(1) is shared by both unit kinds
    if unit.get_enum(1)? != "LENGTHUNIT" || depth > MAX_UNIT_DEPTH {
        return None;
    }

    match unit.ifc_type {
        // IFCSIUNIT(*, UnitType, Prefix, Name)
        IfcType::IfcSIUnit => {
            if unit.get_enum(3)? != "METRE" {
                return None;
            }
            Some(unit.get_enum(2).map_or(1.0, si_prefix))
        }
        // IFCCONVERSIONBASEDUNIT(Dimensions, UnitType, Name, ConversionFactor)
        IfcType::IfcConversionBasedUnit => {
            let factor = resolver.get(unit.get_ref(3)?)?;
            if factor.ifc_type != IfcType::IfcMeasureWithUnit {
                return None;
            }
            // IFCMEASUREWITHUNIT(ValueComponent, UnitComponent)
            let value = factor.get_float(0)?;
            let base = factor
                .get_ref(1)
                .and_then(|id| resolver.get(id))
                .and_then(|base| unit_scale(&base, resolver, depth + 1))
                .unwrap_or(1.0);
            Some(value * base)
        }
        _ => None,
    }
}

fn si_prefix(prefix: &str) -> f64 {
    match prefix {
        "EXA" => 1e18,
        "PETA" => 1e15,
        "TERA" => 1e12,
        "GIGA" => 1e9,
        "MEGA" => 1e6,
        "KILO" => 1e3,
        "HECTO" => 1e2,
        "DECA" => 1e1,
        "DECI" => 1e-1,
        "CENTI" => 1e-2,
        "MILLI" => 1e-3,
        "MICRO" => 1e-6,
        "NANO" => 1e-9,
        "PICO" => 1e-12,
        "FEMTO" => 1e-15,
        "ATTO" => 1e-18,
        _ => 1.0,
    }
}
