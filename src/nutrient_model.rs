//! # Nutrient Model
//!
//! This module defines the fixed nutrient key set and the nutrient vector used
//! for every total in the crate, together with its arithmetic.
//!
//! ## Core Concepts
//!
//! - **NutrientKey**: one of the eleven tracked nutrients, with display metadata
//! - **NutrientTotals**: a value for every key, where `None` means "unknown"
//! - **Unknown propagation**: adding anything to an unknown entry yields unknown,
//!   an unknown is never silently read as zero
//!
//! ## Usage
//!
//! ```rust
//! use nutrient_tracker::nutrient_model::{NutrientKey, NutrientTotals};
//!
//! let apple = NutrientTotals::zero().with(NutrientKey::Calories, Some(52.0));
//! let two_apples = apple.scale(2.0);
//! assert_eq!(two_apples.get(NutrientKey::Calories), Some(104.0));
//!
//! let unknown = two_apples.add(&NutrientTotals::unknown());
//! assert_eq!(unknown.get(NutrientKey::Calories), None);
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;
use std::ops::Index;

/// A single nutrient amount; `None` is the explicit "unknown" marker
pub type NutrientValue = Option<f64>;

/// Number of tracked nutrients
pub const NUTRIENT_COUNT: usize = 11;

/// The tracked nutrients, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NutrientKey {
    Calories,
    Protein,
    Fat,
    Carbohydrates,
    Fiber,
    VitaminC,
    VitaminA,
    Iron,
    Calcium,
    Potassium,
    Sodium,
}

impl NutrientKey {
    /// Every key, in display order
    pub const ALL: [NutrientKey; NUTRIENT_COUNT] = [
        NutrientKey::Calories,
        NutrientKey::Protein,
        NutrientKey::Fat,
        NutrientKey::Carbohydrates,
        NutrientKey::Fiber,
        NutrientKey::VitaminC,
        NutrientKey::VitaminA,
        NutrientKey::Iron,
        NutrientKey::Calcium,
        NutrientKey::Potassium,
        NutrientKey::Sodium,
    ];

    /// Field name used in storage columns and persisted payloads
    pub const fn field_name(self) -> &'static str {
        match self {
            NutrientKey::Calories => "calories_kcal",
            NutrientKey::Protein => "protein_g",
            NutrientKey::Fat => "fat_g",
            NutrientKey::Carbohydrates => "carbs_g",
            NutrientKey::Fiber => "fiber_g",
            NutrientKey::VitaminC => "vitamin_c_mg",
            NutrientKey::VitaminA => "vitamin_a_ug",
            NutrientKey::Iron => "iron_mg",
            NutrientKey::Calcium => "calcium_mg",
            NutrientKey::Potassium => "potassium_mg",
            NutrientKey::Sodium => "sodium_mg",
        }
    }

    /// Human-readable label
    pub const fn label(self) -> &'static str {
        match self {
            NutrientKey::Calories => "Calories",
            NutrientKey::Protein => "Protein",
            NutrientKey::Fat => "Fat",
            NutrientKey::Carbohydrates => "Carbohydrates",
            NutrientKey::Fiber => "Fiber",
            NutrientKey::VitaminC => "Vitamin C",
            NutrientKey::VitaminA => "Vitamin A",
            NutrientKey::Iron => "Iron",
            NutrientKey::Calcium => "Calcium",
            NutrientKey::Potassium => "Potassium",
            NutrientKey::Sodium => "Sodium",
        }
    }

    /// Display unit of the nutrient amount
    pub const fn unit(self) -> &'static str {
        match self {
            NutrientKey::Calories => "kcal",
            NutrientKey::Protein
            | NutrientKey::Fat
            | NutrientKey::Carbohydrates
            | NutrientKey::Fiber => "g",
            NutrientKey::VitaminA => "mcg",
            NutrientKey::VitaminC
            | NutrientKey::Iron
            | NutrientKey::Calcium
            | NutrientKey::Potassium
            | NutrientKey::Sodium => "mg",
        }
    }

    /// Name used by RDI reference rows for this nutrient
    pub const fn rdi_name(self) -> &'static str {
        match self {
            NutrientKey::Calories => "calories",
            NutrientKey::Protein => "protein",
            NutrientKey::Fat => "fat",
            NutrientKey::Carbohydrates => "carbohydrate",
            NutrientKey::Fiber => "fiber",
            NutrientKey::VitaminC => "vitamin_c",
            NutrientKey::VitaminA => "vitamin_a",
            NutrientKey::Iron => "iron",
            NutrientKey::Calcium => "calcium",
            NutrientKey::Potassium => "potassium",
            NutrientKey::Sodium => "sodium",
        }
    }

    /// Look up a key by its field name (e.g. `"protein_g"`)
    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.field_name() == name)
    }

    /// Look up a key by its RDI name (e.g. `"vitamin_c"`)
    pub fn from_rdi_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|key| key.rdi_name() == name)
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for NutrientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A full nutrient vector: every key always carries a value or an explicit unknown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutrientTotals {
    values: [NutrientValue; NUTRIENT_COUNT],
}

impl NutrientTotals {
    /// Every nutrient set to zero
    pub const fn zero() -> Self {
        Self {
            values: [Some(0.0); NUTRIENT_COUNT],
        }
    }

    /// Every nutrient set to unknown
    pub const fn unknown() -> Self {
        Self {
            values: [None; NUTRIENT_COUNT],
        }
    }

    /// Build a vector by asking for each key's value
    pub fn from_fn(mut value_for: impl FnMut(NutrientKey) -> NutrientValue) -> Self {
        let mut totals = Self::unknown();
        for key in NutrientKey::ALL {
            totals.values[key.index()] = value_for(key);
        }
        totals
    }

    pub fn get(&self, key: NutrientKey) -> NutrientValue {
        self.values[key.index()]
    }

    pub fn set(&mut self, key: NutrientKey, value: NutrientValue) {
        self.values[key.index()] = value;
    }

    /// Builder-style setter
    pub fn with(mut self, key: NutrientKey, value: NutrientValue) -> Self {
        self.set(key, value);
        self
    }

    /// Iterate over `(key, value)` pairs in display order
    pub fn iter(&self) -> impl Iterator<Item = (NutrientKey, NutrientValue)> + '_ {
        NutrientKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }

    /// Entrywise sum; an unknown on either side stays unknown
    pub fn add(&self, other: &NutrientTotals) -> NutrientTotals {
        Self::from_fn(|key| match (self.get(key), other.get(key)) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        })
    }

    /// Multiply every known entry by `factor`
    pub fn scale(&self, factor: f64) -> NutrientTotals {
        Self::from_fn(|key| self.get(key).map(|value| value * factor))
    }

    /// Divide every known entry by `divisor`
    ///
    /// A zero divisor makes the whole vector unknown rather than producing
    /// infinities in individual entries.
    pub fn divide(&self, divisor: f64) -> NutrientTotals {
        if divisor == 0.0 {
            return Self::unknown();
        }
        Self::from_fn(|key| self.get(key).map(|value| value / divisor))
    }

    /// True when no entry is known
    pub fn is_unknown(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Strictly parse a JSON object keyed by nutrient field names
    ///
    /// Every key must be present with either `null` or a finite number; any
    /// other shape rejects the whole object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut totals = Self::unknown();
        for key in NutrientKey::ALL {
            let parsed = match object.get(key.field_name())? {
                Value::Null => None,
                Value::Number(number) => Some(number.as_f64().filter(|v| v.is_finite())?),
                _ => return None,
            };
            totals.set(key, parsed);
        }
        Some(totals)
    }
}

impl Default for NutrientTotals {
    fn default() -> Self {
        Self::zero()
    }
}

impl Index<NutrientKey> for NutrientTotals {
    type Output = NutrientValue;

    fn index(&self, key: NutrientKey) -> &Self::Output {
        &self.values[key.index()]
    }
}

impl std::iter::Sum for NutrientTotals {
    fn sum<I: Iterator<Item = NutrientTotals>>(iter: I) -> Self {
        iter.fold(NutrientTotals::zero(), |acc, next| acc.add(&next))
    }
}

impl Serialize for NutrientTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUTRIENT_COUNT))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key.field_name(), &value.filter(|v| v.is_finite()))?;
        }
        map.end()
    }
}

/// Render a nutrient amount for display, `NA` when unknown
///
/// Rounds to `fraction_digits` and drops trailing zeros.
pub fn format_value(value: NutrientValue, fraction_digits: i32) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let factor = 10f64.powi(fraction_digits);
            let rounded = (v * factor).round() / factor;
            // Avoid printing "-0"
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{rounded}")
        }
        _ => "NA".to_string(),
    }
}
