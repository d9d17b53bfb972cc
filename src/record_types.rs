//! # Record Types Module
//!
//! Records exchanged with the record store: ingredients with their reference
//! nutrition facts, recipes with their ingredient lines, intake logs, RDI
//! standards and user profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::nutrient_model::NutrientTotals;

/// An ingredient; names are unique
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub default_unit: Option<String>,
}

/// Nutrient values measured for a reference amount of an ingredient
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionFact {
    pub id: i64,
    pub ingredient_id: i64,
    pub per_amount_value: f64,
    pub per_amount_unit: String,
    pub nutrients: NutrientTotals,
    pub created_at: DateTime<Utc>,
}

/// An ingredient together with its facts, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientWithFacts {
    pub ingredient: Ingredient,
    pub facts: Vec<NutritionFact>,
}

impl IngredientWithFacts {
    /// The authoritative fact: the most recently created one
    pub fn primary_fact(&self) -> Option<&NutritionFact> {
        self.facts.iter().max_by_key(|fact| (fact.created_at, fact.id))
    }

    pub fn name(&self) -> &str {
        &self.ingredient.name
    }
}

/// Filter for ingredient listings
#[derive(Debug, Clone, Default)]
pub struct IngredientFilter {
    /// Case-insensitive substring of the ingredient name
    pub name_contains: Option<String>,
    pub category: Option<String>,
}

impl IngredientFilter {
    pub fn matches(&self, ingredient: &Ingredient) -> bool {
        let name_ok = self.name_contains.as_ref().map_or(true, |needle| {
            ingredient
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let category_ok = self
            .category
            .as_ref()
            .map_or(true, |category| ingredient.category.as_ref() == Some(category));
        name_ok && category_ok
    }
}

/// A recipe; names are unique
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub servings: Option<f64>,
}

/// One ingredient line of a recipe
///
/// An absent quantity means the line is not quantified; an absent unit falls
/// back to the ingredient's default unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeLine {
    pub ingredient: IngredientWithFacts,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
}

/// A recipe with its ordered lines and, if present, its raw cached totals
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeWithIngredients {
    pub recipe: Recipe,
    pub lines: Vec<RecipeLine>,
    pub cached_totals: Option<String>,
}

/// Persisted recipe totals cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeTotalsRecord {
    pub recipe_id: i64,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// Self-contained nutrition logged with an intake item
#[derive(Debug, Clone, PartialEq)]
pub struct CustomNutrition {
    pub base_amount_value: f64,
    pub base_amount_unit: String,
    pub nutrients: NutrientTotals,
}

/// Where an intake item's nutrients come from
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeSource {
    Custom(CustomNutrition),
    Recipe(RecipeWithIngredients),
    Ingredient(IngredientWithFacts),
    /// The referenced recipe or ingredient no longer resolves
    Unresolved,
}

impl IntakeSource {
    /// Pick the item's source; a custom override wins over references
    pub fn from_parts(
        custom: Option<CustomNutrition>,
        recipe: Option<RecipeWithIngredients>,
        ingredient: Option<IngredientWithFacts>,
    ) -> Self {
        match (custom, recipe, ingredient) {
            (Some(custom), _, _) => IntakeSource::Custom(custom),
            (None, Some(recipe), _) => IntakeSource::Recipe(recipe),
            (None, None, Some(ingredient)) => IntakeSource::Ingredient(ingredient),
            (None, None, None) => IntakeSource::Unresolved,
        }
    }
}

/// Amount actually consumed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggedAmount {
    pub value: Option<f64>,
    pub unit: Option<String>,
}

impl LoggedAmount {
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value: Some(value),
            unit: Some(unit.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeItem {
    pub id: i64,
    pub source: IntakeSource,
    pub amount: LoggedAmount,
}

/// A timestamped intake event
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub logged_at: DateTime<Utc>,
    pub items: Vec<IntakeItem>,
}

/// Half-open instant range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MALE" | "M" => Ok(Sex::Male),
            "FEMALE" | "F" => Ok(Sex::Female),
            other => Err(format!("unknown sex: {other}")),
        }
    }
}

/// A dynamic RDI standard row
#[derive(Debug, Clone, PartialEq)]
pub struct RdiStandard {
    pub nutrient: String,
    pub unit: String,
    pub male_value: Option<f64>,
    pub female_value: Option<f64>,
    pub source: Option<String>,
    pub region: Option<String>,
}

impl RdiStandard {
    pub fn value_for(&self, sex: Sex) -> Option<f64> {
        match sex {
            Sex::Male => self.male_value,
            Sex::Female => self.female_value,
        }
    }
}

/// Stored user profile; every attribute may be missing
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub timezone: Option<String>,
}

/// Which user to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSelector {
    Id(i64),
    /// The user with the lowest id
    First,
}
