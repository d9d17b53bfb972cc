//! # Recipe Totals Module
//!
//! Computes a recipe's nutrient totals from its ingredient lines, derives the
//! per-serving figures, and keeps the result in the record store's recipe
//! totals cache.
//!
//! ## Cache lifecycle
//!
//! A recipe starts uncached. [`RecipeTotalsEngine::ensure_totals`] computes and
//! persists its payload; later calls return the stored payload as long as it
//! parses. Callers that change a recipe's composition must call
//! [`RecipeTotalsEngine::invalidate`]: staleness is never detected here.
//!
//! The persisted payload is a JSON object:
//!
//! ```json
//! { "totals": { "calories_kcal": 800.0, ... }, "perServing": { ... }, "servings": 4.0 }
//! ```
//!
//! Concurrent computations for the same recipe are not serialized; the last
//! upsert wins, which is harmless because the computation is deterministic.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::contribution::ingredient_totals;
use crate::errors::{NutritionError, Result};
use crate::nutrient_model::NutrientTotals;
use crate::quantity_converter::QuantityConverter;
use crate::record_types::RecipeWithIngredients;
use crate::reference_data::ReferenceData;
use crate::store::RecordStore;

/// Cached totals of a recipe
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeTotalsPayload {
    pub totals: NutrientTotals,
    /// Present only when the recipe has a positive servings count
    pub per_serving: Option<NutrientTotals>,
    pub servings: Option<f64>,
}

impl RecipeTotalsPayload {
    /// Parse a persisted payload
    ///
    /// Returns `None` for anything but the exact expected shape, which the
    /// engine treats as a cache miss.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let totals = NutrientTotals::from_json(object.get("totals")?)?;
        let per_serving = match object.get("perServing") {
            None | Some(Value::Null) => None,
            Some(per_serving) => Some(NutrientTotals::from_json(per_serving)?),
        };
        let servings = match object.get("servings") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => Some(number.as_f64().filter(|v| v.is_finite())?),
            Some(_) => return None,
        };
        Some(Self {
            totals,
            per_serving,
            servings,
        })
    }

    /// Serialize for persistence
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sum the contributions of every line of a recipe
pub fn calculate_recipe_totals(
    converter: &QuantityConverter<'_>,
    recipe: &RecipeWithIngredients,
) -> RecipeTotalsPayload {
    let totals: NutrientTotals = recipe
        .lines
        .iter()
        .map(|line| ingredient_totals(converter, &line.ingredient, line.quantity, line.unit.as_deref()))
        .sum();

    let servings = recipe.recipe.servings.filter(|servings| servings.is_finite());
    let per_serving = servings
        .filter(|servings| *servings > 0.0)
        .map(|servings| totals.divide(servings));

    RecipeTotalsPayload {
        totals,
        per_serving,
        servings,
    }
}

/// Computes and caches recipe totals through a record store
pub struct RecipeTotalsEngine<S: ?Sized> {
    store: Arc<S>,
    reference: Arc<ReferenceData>,
}

impl<S: ?Sized> Clone for RecipeTotalsEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            reference: Arc::clone(&self.reference),
        }
    }
}

impl<S: RecordStore + ?Sized> RecipeTotalsEngine<S> {
    pub fn new(store: Arc<S>, reference: Arc<ReferenceData>) -> Self {
        Self { store, reference }
    }

    /// Totals of a recipe, from cache unless `force` is set or the cache entry
    /// is missing or unparsable
    ///
    /// # Errors
    ///
    /// [`NutritionError::RecipeNotFound`] when the recipe has to be computed
    /// and does not exist, or a store error.
    pub async fn ensure_totals(&self, recipe_id: i64, force: bool) -> Result<RecipeTotalsPayload> {
        if !force {
            if let Some(cached) = self.cached_totals(recipe_id).await? {
                return Ok(cached);
            }
        }

        let recipe = self
            .store
            .recipe_with_ingredients(recipe_id)
            .await?
            .ok_or(NutritionError::RecipeNotFound(recipe_id))?;
        self.compute_and_store(&recipe).await
    }

    /// Like [`ensure_totals`](Self::ensure_totals) for a recipe the caller
    /// already holds, skipping the recipe fetch
    pub async fn ensure_totals_for(
        &self,
        recipe: &RecipeWithIngredients,
        force: bool,
    ) -> Result<RecipeTotalsPayload> {
        if !force {
            if let Some(cached) = self.cached_totals(recipe.recipe.id).await? {
                return Ok(cached);
            }
        }
        self.compute_and_store(recipe).await
    }

    /// The parsed cache entry, without computing anything
    pub async fn cached_totals(&self, recipe_id: i64) -> Result<Option<RecipeTotalsPayload>> {
        let Some(record) = self.store.recipe_totals(recipe_id).await? else {
            return Ok(None);
        };
        let parsed = RecipeTotalsPayload::parse(&record.payload);
        if parsed.is_none() {
            debug!("Ignoring unparsable totals cache entry for recipe {recipe_id}");
        }
        Ok(parsed)
    }

    /// Drop the cache entry of a recipe; a missing entry is fine
    pub async fn invalidate(&self, recipe_id: i64) -> Result<()> {
        self.store.delete_recipe_totals(recipe_id).await?;
        debug!("Invalidated totals cache for recipe {recipe_id}");
        Ok(())
    }

    async fn compute_and_store(&self, recipe: &RecipeWithIngredients) -> Result<RecipeTotalsPayload> {
        let table = self.reference.conversion_table().await;
        let converter = QuantityConverter::new(&table);
        let payload = calculate_recipe_totals(&converter, recipe);

        self.store
            .upsert_recipe_totals(recipe.recipe.id, &payload.to_json()?)
            .await?;
        info!(
            "Computed totals for recipe {} ({:?}, {} lines)",
            recipe.recipe.id,
            recipe.recipe.name,
            recipe.lines.len()
        );
        Ok(payload)
    }
}
