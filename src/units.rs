//! # Unit Normalization
//!
//! Canonicalizes raw unit strings and classifies them against the fixed mass,
//! volume and count vocabularies.
//!
//! ## Features
//!
//! - Trim/lowercase normalization with a locale override table (Chinese
//!   synonyms for gram, kilogram, milligram, microgram, liter, milliliter)
//! - Fixed unit-to-gram and unit-to-milliliter factor tables
//! - Dimensionless count units (servings, portions)
//!
//! Normalization never fails loudly: an unrecognized unit is returned as-is
//! and simply fails to resolve further down the conversion chain.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Canonical mass unit
pub const GRAMS: &str = "g";
/// Canonical volume unit
pub const MILLILITERS: &str = "ml";
/// Canonical count unit
pub const SERVING: &str = "serving";

/// Locale-specific synonyms substituted before any interpretation
static UNIT_OVERRIDES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert("公克", "g");
    map.insert("克", "g");
    map.insert("公斤", "kg");
    map.insert("毫克", "mg");
    map.insert("微克", "μg");
    map.insert("μg", "μg");
    map.insert("µg", "μg"); // micro sign U+00B5
    map.insert("mcg", "μg");
    map.insert("公升", "l");
    map.insert("毫升", "ml");
    map.insert("立方公分", "ml");
    map
});

/// Mass units and their factor to grams
///
/// Pieces weigh one gram unless an ingredient-qualified conversion says
/// otherwise.
static MASS_UNIT_TO_GRAMS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert("g", 1.0);
    map.insert("gram", 1.0);
    map.insert("grams", 1.0);
    map.insert("piece", 1.0);
    map.insert("pieces", 1.0);
    map.insert("顆", 1.0);
    map.insert("kg", 1000.0);
    map.insert("kilogram", 1000.0);
    map.insert("kilograms", 1000.0);
    map.insert("mg", 0.001);
    map.insert("milligram", 0.001);
    map.insert("milligrams", 0.001);
    map.insert("μg", 0.000_001);
    map.insert("ug", 0.000_001);
    map.insert("oz", 28.3495);
    map.insert("ounce", 28.3495);
    map.insert("ounces", 28.3495);
    map.insert("lb", 453.592);
    map.insert("lbs", 453.592);
    map.insert("pound", 453.592);
    map.insert("pounds", 453.592);
    map
});

/// Volume units and their factor to milliliters
static VOLUME_UNIT_TO_ML: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert("ml", 1.0);
    map.insert("milliliter", 1.0);
    map.insert("milliliters", 1.0);
    map.insert("cc", 1.0);
    map.insert("cm3", 1.0);
    map.insert("l", 1000.0);
    map.insert("liter", 1000.0);
    map.insert("liters", 1000.0);
    map.insert("cup", 240.0);
    map.insert("cups", 240.0);
    map.insert("杯", 240.0);
    map.insert("tbsp", 15.0);
    map.insert("tablespoon", 15.0);
    map.insert("tablespoons", 15.0);
    map.insert("tsp", 5.0);
    map.insert("teaspoon", 5.0);
    map.insert("teaspoons", 5.0);
    map
});

/// Units counting discrete portions rather than measuring mass or volume
static DIMENSIONLESS_UNITS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "serving", "servings", "portion", "portions", "份",
    ]
    .into_iter()
    .collect()
});

/// Broad class of a normalized unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    Mass,
    Volume,
    Count,
    Other,
}

/// Normalize a raw unit string
///
/// Returns `None` for empty or whitespace-only input. The result is stable
/// under repeated normalization.
///
/// # Examples
///
/// ```rust
/// use nutrient_tracker::units::normalize_unit;
///
/// assert_eq!(normalize_unit(" Cups ").as_deref(), Some("cups"));
/// assert_eq!(normalize_unit("公克").as_deref(), Some("g"));
/// assert_eq!(normalize_unit("   "), None);
/// ```
pub fn normalize_unit(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    match UNIT_OVERRIDES.get(trimmed.as_str()) {
        Some(canonical) => Some((*canonical).to_string()),
        None => Some(trimmed),
    }
}

/// Normalize an optional unit
pub fn normalize_optional_unit(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_unit)
}

/// Factor from a normalized mass unit to grams
pub fn grams_per_unit(unit: &str) -> Option<f64> {
    MASS_UNIT_TO_GRAMS.get(unit).copied()
}

/// Factor from a normalized volume unit to milliliters
pub fn milliliters_per_unit(unit: &str) -> Option<f64> {
    VOLUME_UNIT_TO_ML.get(unit).copied()
}

pub fn is_mass_unit(unit: &str) -> bool {
    MASS_UNIT_TO_GRAMS.contains_key(unit)
}

pub fn is_volume_unit(unit: &str) -> bool {
    VOLUME_UNIT_TO_ML.contains_key(unit)
}

pub fn is_dimensionless_unit(unit: &str) -> bool {
    DIMENSIONLESS_UNITS.contains(unit)
}

/// Classify a normalized unit
///
/// The mass, volume and count vocabularies are disjoint.
pub fn classify(unit: &str) -> UnitClass {
    if is_dimensionless_unit(unit) {
        UnitClass::Count
    } else if is_mass_unit(unit) {
        UnitClass::Mass
    } else if is_volume_unit(unit) {
        UnitClass::Volume
    } else {
        UnitClass::Other
    }
}

/// Express an amount of grams in the given normalized mass unit
pub fn grams_to_unit(grams: f64, unit: &str) -> Option<f64> {
    grams_per_unit(unit).map(|factor| grams / factor)
}

/// Express an amount of milliliters in the given normalized volume unit
pub fn milliliters_to_unit(ml: f64, unit: &str) -> Option<f64> {
    milliliters_per_unit(unit).map(|factor| ml / factor)
}
