//! # Intake Aggregation Module
//!
//! Sums the nutrients of every intake item logged within a time range.
//!
//! Each item is dispatched on its [`IntakeSource`]:
//!
//! - **Custom**: the logged amount is compared with the override's own base
//!   amount (see [`custom_totals`])
//! - **Recipe**: the recipe's totals, or its per-serving totals when the item
//!   was logged in servings, scaled by the logged amount
//! - **Ingredient**: the ingredient's contribution for the logged quantity
//! - **Unresolved**: unknown
//!
//! Within one aggregation each recipe's totals are resolved once.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::contribution::ingredient_totals;
use crate::errors::Result;
use crate::nutrient_model::NutrientTotals;
use crate::quantity_converter::QuantityConverter;
use crate::recipe_totals::{RecipeTotalsEngine, RecipeTotalsPayload};
use crate::record_types::{CustomNutrition, IntakeItem, IntakeSource, LoggedAmount, RecipeWithIngredients, TimeRange};
use crate::reference_data::ReferenceData;
use crate::store::RecordStore;
use crate::units::{is_dimensionless_unit, normalize_unit};

/// Whether a logged unit means "servings of a recipe"
pub fn is_serving_unit(unit: Option<&str>) -> bool {
    match unit.and_then(normalize_unit) {
        Some(unit) => unit.contains("serv") || is_dimensionless_unit(&unit),
        None => false,
    }
}

/// How a custom override's logged amount is related to its base amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomRatioStrategy {
    /// Logged and base units normalize to the same text
    SameUnit,
    /// Both amounts convert to grams
    Grams,
}

impl CustomRatioStrategy {
    pub const ORDER: [CustomRatioStrategy; 2] = [CustomRatioStrategy::SameUnit, CustomRatioStrategy::Grams];
}

fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && v.is_finite())
}

fn custom_ratio(
    strategy: CustomRatioStrategy,
    converter: &QuantityConverter<'_>,
    base_value: f64,
    base_unit: &str,
    logged_value: f64,
    logged_unit: &str,
) -> Option<f64> {
    match strategy {
        CustomRatioStrategy::SameUnit => {
            let base = normalize_unit(base_unit)?;
            let logged = normalize_unit(logged_unit)?;
            if base != logged {
                return None;
            }
            Some(nonzero(Some(logged_value))? / nonzero(Some(base_value))?)
        }
        CustomRatioStrategy::Grams => {
            let base = nonzero(converter.to_grams(base_value, Some(base_unit), None))?;
            let logged = nonzero(converter.to_grams(logged_value, Some(logged_unit), None))?;
            Some(logged / base)
        }
    }
}

/// Nutrients of a custom override for the logged amount
///
/// The logged value defaults to the override's base value and the logged unit
/// to its base unit. Strategies are tried in [`CustomRatioStrategy::ORDER`];
/// when none applies the result is unknown.
pub fn custom_totals(
    converter: &QuantityConverter<'_>,
    custom: &CustomNutrition,
    amount: &LoggedAmount,
) -> NutrientTotals {
    let logged_value = amount.value.unwrap_or(custom.base_amount_value);
    let logged_unit = amount.unit.as_deref().unwrap_or(&custom.base_amount_unit);

    CustomRatioStrategy::ORDER
        .into_iter()
        .find_map(|strategy| {
            custom_ratio(
                strategy,
                converter,
                custom.base_amount_value,
                &custom.base_amount_unit,
                logged_value,
                logged_unit,
            )
        })
        .map_or_else(NutrientTotals::unknown, |ratio| custom.nutrients.scale(ratio))
}

/// Scale a recipe's totals for a logged amount
///
/// The amount value defaults to one; per-serving totals are used when the
/// amount is in servings and the recipe has them.
pub fn recipe_item_totals(totals: &RecipeTotalsPayload, amount: &LoggedAmount) -> NutrientTotals {
    let multiplier = amount.value.unwrap_or(1.0);
    match &totals.per_serving {
        Some(per_serving) if is_serving_unit(amount.unit.as_deref()) => per_serving.scale(multiplier),
        _ => totals.totals.scale(multiplier),
    }
}

/// Aggregates logged intake through a record store
pub struct IntakeAggregator<S: ?Sized> {
    store: Arc<S>,
    reference: Arc<ReferenceData>,
    recipes: RecipeTotalsEngine<S>,
}

impl<S: RecordStore + ?Sized> IntakeAggregator<S> {
    pub fn new(store: Arc<S>, reference: Arc<ReferenceData>) -> Self {
        Self {
            recipes: RecipeTotalsEngine::new(Arc::clone(&store), Arc::clone(&reference)),
            store,
            reference,
        }
    }

    /// Sum of everything logged in `[start, end)`, for one user or for all
    ///
    /// Zero when nothing was logged. May compute and persist recipe totals
    /// that were not cached yet.
    pub async fn aggregate(
        &self,
        user_id: Option<i64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NutrientTotals> {
        let logs = self.store.intake_logs(TimeRange::new(start, end), user_id).await?;
        let table = self.reference.conversion_table().await;
        let converter = QuantityConverter::new(&table);
        let mut memo = HashMap::new();

        let mut totals = NutrientTotals::zero();
        for log in &logs {
            let mut log_totals = NutrientTotals::zero();
            for item in &log.items {
                let addition = self.item_totals(&converter, item, &mut memo).await?;
                log_totals = log_totals.add(&addition);
            }
            totals = totals.add(&log_totals);
        }
        debug!(
            "Aggregated {} intake logs between {start} and {end} (user {user_id:?})",
            logs.len()
        );
        Ok(totals)
    }

    async fn item_totals(
        &self,
        converter: &QuantityConverter<'_>,
        item: &IntakeItem,
        memo: &mut HashMap<i64, RecipeTotalsPayload>,
    ) -> Result<NutrientTotals> {
        Ok(match &item.source {
            IntakeSource::Custom(custom) => custom_totals(converter, custom, &item.amount),
            IntakeSource::Recipe(recipe) => {
                let totals = self.recipe_totals(recipe, memo).await?;
                recipe_item_totals(&totals, &item.amount)
            }
            IntakeSource::Ingredient(ingredient) => ingredient_totals(
                converter,
                ingredient,
                item.amount.value,
                item.amount.unit.as_deref(),
            ),
            IntakeSource::Unresolved => {
                debug!("Intake item {} has no resolvable source", item.id);
                NutrientTotals::unknown()
            }
        })
    }

    async fn recipe_totals(
        &self,
        recipe: &RecipeWithIngredients,
        memo: &mut HashMap<i64, RecipeTotalsPayload>,
    ) -> Result<RecipeTotalsPayload> {
        let id = recipe.recipe.id;
        if let Some(totals) = memo.get(&id) {
            return Ok(totals.clone());
        }
        let totals = match recipe.cached_totals.as_deref().and_then(RecipeTotalsPayload::parse) {
            Some(cached) => cached,
            None => self.recipes.ensure_totals_for(recipe, false).await?,
        };
        memo.insert(id, totals.clone());
        Ok(totals)
    }
}
