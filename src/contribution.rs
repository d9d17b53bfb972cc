//! # Ingredient Contribution
//!
//! Scales an ingredient's reference nutrition fact to a consumed quantity.
//!
//! Both the reference amount and the consumed amount are expressed in the
//! fact's own unit before the ratio is taken, so a fact recorded per 100 g and
//! a line measured in kilograms, or in ingredient-specific pieces, compare
//! directly.

use tracing::debug;

use crate::nutrient_model::NutrientTotals;
use crate::quantity_converter::QuantityConverter;
use crate::record_types::IngredientWithFacts;
use crate::units::{normalize_unit, GRAMS};

/// Nutrients contributed by `quantity` `unit` of an ingredient
///
/// An absent unit falls back to the ingredient's default unit. The result is
/// entirely unknown when the ingredient has no fact, when either amount
/// cannot be expressed in the fact's unit, or when the fact's amount is zero.
pub fn ingredient_totals(
    converter: &QuantityConverter<'_>,
    ingredient: &IngredientWithFacts,
    quantity: Option<f64>,
    unit: Option<&str>,
) -> NutrientTotals {
    let Some(fact) = ingredient.primary_fact() else {
        debug!("No nutrition fact for ingredient {:?}", ingredient.name());
        return NutrientTotals::unknown();
    };

    let name = Some(ingredient.name());
    let base_unit = normalize_unit(&fact.per_amount_unit).unwrap_or_else(|| GRAMS.to_string());
    let base_amount = converter.convert(
        fact.per_amount_value,
        Some(fact.per_amount_unit.as_str()),
        Some(base_unit.as_str()),
        name,
    );

    let consumed_unit = unit.or(ingredient.ingredient.default_unit.as_deref());
    let used_amount = quantity
        .and_then(|value| converter.convert(value, consumed_unit, Some(base_unit.as_str()), name));

    match (base_amount, used_amount) {
        (Some(base), Some(used)) if base != 0.0 => fact.nutrients.scale(used / base),
        _ => {
            debug!(
                "Unresolved amount for {:?}: {quantity:?} {consumed_unit:?} against {} {}",
                ingredient.name(),
                fact.per_amount_value,
                fact.per_amount_unit
            );
            NutrientTotals::unknown()
        }
    }
}
