//! # Unit Conversion Table
//!
//! Ingredient- and unit-qualified conversion factors loaded from a JSON file.
//!
//! The file maps keys to either a bare factor or a `{ "to": unit, "factor": n }`
//! object:
//!
//! ```json
//! {
//!   "apple_顆_g": 150,
//!   "rice_cup": { "to": "g", "factor": 185 }
//! }
//! ```
//!
//! A bare factor takes its target unit from the last `_` segment of the key.
//! Keys are normalized so that `"Olive Oil-tbsp"` and `"olive_oil_tbsp"` are the
//! same entry.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{NutritionError, Result};
use crate::units::normalize_unit;

lazy_static! {
    static ref SEPARATOR_RUN: Regex =
        Regex::new(r"[\s\-]+").expect("separator pattern should be valid");
    static ref DISALLOWED_KEY_CHARS: Regex = Regex::new(r"[^a-z0-9_\x{4e00}-\x{9fff}]+")
        .expect("key character pattern should be valid");
}

/// A resolved conversion: multiply by `factor` to obtain an amount in `to`
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionEntry {
    pub to: String,
    pub factor: f64,
}

/// Raw file entry, either shorthand or explicit
#[derive(Deserialize)]
#[serde(untagged)]
enum RawConversion {
    Factor(f64),
    Explicit { to: String, factor: f64 },
    Malformed(serde_json::Value),
}

/// What to look up: a unit, optionally qualified by target unit and ingredient
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionLookup<'a> {
    pub unit: &'a str,
    pub target_unit: Option<&'a str>,
    pub ingredient_name: Option<&'a str>,
}

impl<'a> ConversionLookup<'a> {
    pub fn new(unit: &'a str) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    pub fn to(mut self, target_unit: &'a str) -> Self {
        self.target_unit = Some(target_unit);
        self
    }

    pub fn for_ingredient(mut self, ingredient_name: Option<&'a str>) -> Self {
        self.ingredient_name = ingredient_name;
        self
    }
}

/// Normalize one segment of a conversion key
///
/// Lowercases, turns whitespace and hyphen runs into `_`, and strips
/// everything outside `a-z`, `0-9`, `_` and CJK ideographs.
pub fn normalize_key_part(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let joined = SEPARATOR_RUN.replace_all(&lowered, "_");
    DISALLOWED_KEY_CHARS.replace_all(&joined, "").into_owned()
}

/// Candidate keys for a lookup, most specific first
///
/// `{ingredient}_{unit}_{target}`, `{ingredient}_{unit}`, `{unit}_{target}`, `{unit}`
pub fn lookup_keys(lookup: &ConversionLookup<'_>) -> Vec<String> {
    let unit = normalize_key_part(lookup.unit);
    let target = lookup
        .target_unit
        .map(normalize_key_part)
        .filter(|t| !t.is_empty());
    let ingredient = lookup
        .ingredient_name
        .map(normalize_key_part)
        .filter(|i| !i.is_empty());

    let mut keys = Vec::with_capacity(4);
    if let Some(ingredient) = &ingredient {
        if let Some(target) = &target {
            keys.push(format!("{ingredient}_{unit}_{target}"));
        }
        keys.push(format!("{ingredient}_{unit}"));
    }
    if let Some(target) = &target {
        keys.push(format!("{unit}_{target}"));
    }
    keys.push(unit);
    keys
}

/// Table of qualified conversion factors
#[derive(Debug, Clone, Default)]
pub struct ConversionTable {
    entries: HashMap<String, ConversionEntry>,
}

impl ConversionTable {
    /// An empty table: every qualified lookup misses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a table from JSON text
    ///
    /// Entries that are neither a number nor a `{to, factor}` object are
    /// skipped, as are keys that normalize to nothing.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, RawConversion> = serde_json::from_str(raw)?;
        let mut entries = HashMap::with_capacity(parsed.len());

        for (raw_key, raw_entry) in parsed {
            let key = normalize_key_part(&raw_key);
            if key.is_empty() {
                continue;
            }
            let entry = match raw_entry {
                RawConversion::Factor(factor) => {
                    let target = key.rsplit('_').next().unwrap_or_default();
                    if target.is_empty() {
                        continue;
                    }
                    ConversionEntry {
                        to: target.to_string(),
                        factor,
                    }
                }
                RawConversion::Explicit { to, factor } => ConversionEntry {
                    to: normalize_unit(&to).unwrap_or_else(|| normalize_key_part(&to)),
                    factor,
                },
                RawConversion::Malformed(value) => {
                    debug!("Skipping malformed unit conversion {raw_key:?}: {value}");
                    continue;
                }
            };
            entries.insert(key, entry);
        }

        Ok(Self { entries })
    }

    /// Load a table from disk, degrading to an empty table on any failure
    pub async fn load(path: &Path) -> Self {
        match Self::try_load(path).await {
            Ok(table) => {
                info!(
                    "Loaded {} unit conversions from {}",
                    table.len(),
                    path.display()
                );
                table
            }
            Err(e) => {
                warn!("Unit conversion table unavailable, using empty table: {e}");
                Self::empty()
            }
        }
    }

    async fn try_load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NutritionError::ReferenceLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::from_json_str(&raw).map_err(|e| NutritionError::ReferenceLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Insert or replace an entry; key and target are normalized first
    pub fn insert(&mut self, key: &str, to: &str, factor: f64) {
        self.entries.insert(
            normalize_key_part(key),
            ConversionEntry {
                to: normalize_key_part(to),
                factor,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the most specific entry for a lookup
    ///
    /// When a target unit is requested, entries declaring a different target
    /// are skipped.
    pub fn resolve(&self, lookup: &ConversionLookup<'_>) -> Option<&ConversionEntry> {
        let target = lookup
            .target_unit
            .map(normalize_key_part)
            .filter(|t| !t.is_empty());
        lookup_keys(lookup).into_iter().find_map(|key| {
            let entry = self.entries.get(&key)?;
            match &target {
                Some(target) if normalize_key_part(&entry.to) != *target => None,
                _ => Some(entry),
            }
        })
    }

    /// Convert `value` with the most specific matching entry
    pub fn convert(&self, value: f64, lookup: &ConversionLookup<'_>) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        self.resolve(lookup).map(|entry| value * entry.factor)
    }
}
