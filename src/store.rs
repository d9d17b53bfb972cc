//! # Record Store Module
//!
//! The storage contract consumed by the nutrition core, and an in-memory
//! implementation of it.
//!
//! The core never talks to a database directly. Everything it reads or
//! writes goes through [`RecordStore`], which any backend can implement; the
//! PostgreSQL backend lives in [`crate::db`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::nutrient_model::NutrientTotals;
use crate::record_types::{
    CustomNutrition, Ingredient, IngredientFilter, IngredientWithFacts, IntakeItem, IntakeLog,
    IntakeSource, LoggedAmount, NutritionFact, RdiStandard, Recipe, RecipeLine,
    RecipeTotalsRecord, RecipeWithIngredients, Sex, TimeRange, UserProfile, UserSelector,
};

/// Storage operations required by the nutrition core
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn ingredient_by_id(&self, id: i64) -> Result<Option<IngredientWithFacts>>;

    async fn ingredient_by_name(&self, name: &str) -> Result<Option<IngredientWithFacts>>;

    async fn list_ingredients(&self, filter: &IngredientFilter) -> Result<Vec<Ingredient>>;

    /// All facts of an ingredient, newest first
    async fn nutrition_facts(&self, ingredient_id: i64) -> Result<Vec<NutritionFact>>;

    /// A recipe with its lines, their ingredients and facts
    async fn recipe_with_ingredients(&self, id: i64) -> Result<Option<RecipeWithIngredients>>;

    async fn recipe_by_name(&self, name: &str) -> Result<Option<Recipe>>;

    async fn recipe_totals(&self, recipe_id: i64) -> Result<Option<RecipeTotalsRecord>>;

    async fn upsert_recipe_totals(&self, recipe_id: i64, payload: &str) -> Result<()>;

    /// Remove a cache entry; removing an absent entry is not an error
    async fn delete_recipe_totals(&self, recipe_id: i64) -> Result<()>;

    /// Logs with `logged_at` in `range`, oldest first, optionally for one user
    async fn intake_logs(&self, range: TimeRange, user_id: Option<i64>) -> Result<Vec<IntakeLog>>;

    async fn rdi_standards(&self) -> Result<Vec<RdiStandard>>;

    async fn user(&self, selector: UserSelector) -> Result<Option<UserProfile>>;
}

/// Source reference of a stored intake item
#[derive(Debug, Clone, PartialEq)]
pub enum NewIntakeSource {
    Recipe(i64),
    Ingredient(i64),
    Custom(CustomNutrition),
}

/// An intake item to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewIntakeItem {
    pub source: NewIntakeSource,
    pub amount: LoggedAmount,
}

impl NewIntakeItem {
    pub fn recipe(recipe_id: i64, amount: LoggedAmount) -> Self {
        Self {
            source: NewIntakeSource::Recipe(recipe_id),
            amount,
        }
    }

    pub fn ingredient(ingredient_id: i64, amount: LoggedAmount) -> Self {
        Self {
            source: NewIntakeSource::Ingredient(ingredient_id),
            amount,
        }
    }

    pub fn custom(nutrition: CustomNutrition, amount: LoggedAmount) -> Self {
        Self {
            source: NewIntakeSource::Custom(nutrition),
            amount,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredLine {
    ingredient_id: i64,
    quantity: Option<f64>,
    unit: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredItem {
    id: i64,
    source: NewIntakeSource,
    amount: LoggedAmount,
}

#[derive(Debug, Clone)]
struct StoredLog {
    id: i64,
    user_id: Option<i64>,
    logged_at: DateTime<Utc>,
    items: Vec<StoredItem>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    ingredients: BTreeMap<i64, Ingredient>,
    facts: BTreeMap<i64, NutritionFact>,
    recipes: BTreeMap<i64, Recipe>,
    lines: BTreeMap<i64, Vec<StoredLine>>,
    totals: BTreeMap<i64, RecipeTotalsRecord>,
    logs: BTreeMap<i64, StoredLog>,
    standards: Vec<RdiStandard>,
    users: BTreeMap<i64, UserProfile>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn facts_for(&self, ingredient_id: i64) -> Vec<NutritionFact> {
        let mut facts: Vec<NutritionFact> = self
            .facts
            .values()
            .filter(|fact| fact.ingredient_id == ingredient_id)
            .cloned()
            .collect();
        facts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        facts
    }

    fn ingredient_with_facts(&self, id: i64) -> Option<IngredientWithFacts> {
        let ingredient = self.ingredients.get(&id)?.clone();
        Some(IngredientWithFacts {
            facts: self.facts_for(id),
            ingredient,
        })
    }

    fn recipe_with_ingredients(&self, id: i64) -> Option<RecipeWithIngredients> {
        let recipe = self.recipes.get(&id)?.clone();
        let lines = self
            .lines
            .get(&id)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| {
                        Some(RecipeLine {
                            ingredient: self.ingredient_with_facts(line.ingredient_id)?,
                            quantity: line.quantity,
                            unit: line.unit.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(RecipeWithIngredients {
            recipe,
            lines,
            cached_totals: self.totals.get(&id).map(|record| record.payload.clone()),
        })
    }

    fn resolve_item(&self, item: &StoredItem) -> IntakeItem {
        let source = match &item.source {
            NewIntakeSource::Custom(custom) => IntakeSource::from_parts(Some(custom.clone()), None, None),
            NewIntakeSource::Recipe(id) => {
                IntakeSource::from_parts(None, self.recipe_with_ingredients(*id), None)
            }
            NewIntakeSource::Ingredient(id) => {
                IntakeSource::from_parts(None, None, self.ingredient_with_facts(*id))
            }
        };
        IntakeItem {
            id: item.id,
            source,
            amount: item.amount.clone(),
        }
    }
}

/// Record store kept entirely in memory
///
/// Used by tests and by the CLI when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_ingredient(
        &self,
        name: &str,
        category: Option<&str>,
        default_unit: Option<&str>,
    ) -> i64 {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        state.ingredients.insert(
            id,
            Ingredient {
                id,
                name: name.to_string(),
                category: category.map(str::to_string),
                default_unit: default_unit.map(str::to_string),
            },
        );
        id
    }

    /// Add a fact created now
    pub async fn add_nutrition_fact(
        &self,
        ingredient_id: i64,
        per_amount_value: f64,
        per_amount_unit: &str,
        nutrients: NutrientTotals,
    ) -> i64 {
        self.add_nutrition_fact_at(
            ingredient_id,
            per_amount_value,
            per_amount_unit,
            nutrients,
            Utc::now(),
        )
        .await
    }

    pub async fn add_nutrition_fact_at(
        &self,
        ingredient_id: i64,
        per_amount_value: f64,
        per_amount_unit: &str,
        nutrients: NutrientTotals,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        state.facts.insert(
            id,
            NutritionFact {
                id,
                ingredient_id,
                per_amount_value,
                per_amount_unit: per_amount_unit.to_string(),
                nutrients,
                created_at,
            },
        );
        id
    }

    pub async fn insert_recipe(&self, name: &str, servings: Option<f64>) -> i64 {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        state.recipes.insert(
            id,
            Recipe {
                id,
                name: name.to_string(),
                servings,
            },
        );
        id
    }

    pub async fn add_recipe_line(
        &self,
        recipe_id: i64,
        ingredient_id: i64,
        quantity: Option<f64>,
        unit: Option<&str>,
    ) {
        let mut state = self.state.write().await;
        state.lines.entry(recipe_id).or_default().push(StoredLine {
            ingredient_id,
            quantity,
            unit: unit.map(str::to_string),
        });
    }

    pub async fn insert_intake_log(
        &self,
        user_id: Option<i64>,
        logged_at: DateTime<Utc>,
        items: Vec<NewIntakeItem>,
    ) -> i64 {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let items = items
            .into_iter()
            .map(|item| StoredItem {
                id: state.allocate_id(),
                source: item.source,
                amount: item.amount,
            })
            .collect();
        state.logs.insert(
            id,
            StoredLog {
                id,
                user_id,
                logged_at,
                items,
            },
        );
        id
    }

    pub async fn insert_rdi_standard(&self, standard: RdiStandard) {
        self.state.write().await.standards.push(standard);
    }

    pub async fn insert_user(&self, age: Option<u32>, sex: Option<Sex>, timezone: Option<&str>) -> i64 {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        state.users.insert(
            id,
            UserProfile {
                id,
                age,
                sex,
                timezone: timezone.map(str::to_string),
            },
        );
        id
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ingredient_by_id(&self, id: i64) -> Result<Option<IngredientWithFacts>> {
        Ok(self.state.read().await.ingredient_with_facts(id))
    }

    async fn ingredient_by_name(&self, name: &str) -> Result<Option<IngredientWithFacts>> {
        let state = self.state.read().await;
        let id = state
            .ingredients
            .values()
            .find(|ingredient| ingredient.name == name)
            .map(|ingredient| ingredient.id);
        Ok(id.and_then(|id| state.ingredient_with_facts(id)))
    }

    async fn list_ingredients(&self, filter: &IngredientFilter) -> Result<Vec<Ingredient>> {
        let state = self.state.read().await;
        Ok(state
            .ingredients
            .values()
            .filter(|ingredient| filter.matches(ingredient))
            .cloned()
            .collect())
    }

    async fn nutrition_facts(&self, ingredient_id: i64) -> Result<Vec<NutritionFact>> {
        Ok(self.state.read().await.facts_for(ingredient_id))
    }

    async fn recipe_with_ingredients(&self, id: i64) -> Result<Option<RecipeWithIngredients>> {
        Ok(self.state.read().await.recipe_with_ingredients(id))
    }

    async fn recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        let state = self.state.read().await;
        Ok(state.recipes.values().find(|recipe| recipe.name == name).cloned())
    }

    async fn recipe_totals(&self, recipe_id: i64) -> Result<Option<RecipeTotalsRecord>> {
        Ok(self.state.read().await.totals.get(&recipe_id).cloned())
    }

    async fn upsert_recipe_totals(&self, recipe_id: i64, payload: &str) -> Result<()> {
        self.state.write().await.totals.insert(
            recipe_id,
            RecipeTotalsRecord {
                recipe_id,
                payload: payload.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_recipe_totals(&self, recipe_id: i64) -> Result<()> {
        self.state.write().await.totals.remove(&recipe_id);
        Ok(())
    }

    async fn intake_logs(&self, range: TimeRange, user_id: Option<i64>) -> Result<Vec<IntakeLog>> {
        let state = self.state.read().await;
        let mut logs: Vec<IntakeLog> = state
            .logs
            .values()
            .filter(|log| range.contains(log.logged_at))
            .filter(|log| user_id.is_none() || log.user_id == user_id)
            .map(|log| IntakeLog {
                id: log.id,
                user_id: log.user_id,
                logged_at: log.logged_at,
                items: log.items.iter().map(|item| state.resolve_item(item)).collect(),
            })
            .collect();
        logs.sort_by(|a, b| a.logged_at.cmp(&b.logged_at).then(a.id.cmp(&b.id)));
        Ok(logs)
    }

    async fn rdi_standards(&self) -> Result<Vec<RdiStandard>> {
        Ok(self.state.read().await.standards.clone())
    }

    async fn user(&self, selector: UserSelector) -> Result<Option<UserProfile>> {
        let state = self.state.read().await;
        Ok(match selector {
            UserSelector::Id(id) => state.users.get(&id).cloned(),
            UserSelector::First => state.users.values().next().cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_facts_are_newest_first() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let rice = store.insert_ingredient("Rice", Some("grain"), Some("g")).await;
        let old = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        store
            .add_nutrition_fact_at(rice, 100.0, "g", NutrientTotals::zero(), old)
            .await;
        let newest = store
            .add_nutrition_fact_at(rice, 100.0, "g", NutrientTotals::zero(), old + Duration::days(30))
            .await;

        let facts = store.nutrition_facts(rice).await?;
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].id, newest);

        let by_name = store.ingredient_by_name("Rice").await?;
        assert_eq!(by_name.map(|i| i.facts.len()), Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_recipe_totals_cache_roundtrip() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let recipe = store.insert_recipe("Congee", Some(2.0)).await;

        assert!(store.recipe_totals(recipe).await?.is_none());
        store.upsert_recipe_totals(recipe, "{}").await?;
        store.upsert_recipe_totals(recipe, "{\"totals\":null}").await?;
        let record = store.recipe_totals(recipe).await?;
        assert_eq!(record.map(|r| r.payload), Some("{\"totals\":null}".to_string()));

        store.delete_recipe_totals(recipe).await?;
        store.delete_recipe_totals(recipe).await?;
        assert!(store.recipe_totals(recipe).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_intake_logs_filter_by_range_and_user() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let apple = store.insert_ingredient("Apple", None, None).await;
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let item = || vec![NewIntakeItem::ingredient(apple, LoggedAmount::new(1.0, "顆"))];

        store.insert_intake_log(Some(1), day + Duration::hours(20), item()).await;
        store.insert_intake_log(Some(1), day + Duration::hours(8), item()).await;
        store.insert_intake_log(Some(2), day + Duration::hours(9), item()).await;
        store.insert_intake_log(Some(1), day + Duration::days(1), item()).await;

        let range = TimeRange::new(day, day + Duration::days(1));
        let logs = store.intake_logs(range, Some(1)).await?;
        assert_eq!(logs.len(), 2);
        assert!(logs[0].logged_at < logs[1].logged_at);
        assert!(matches!(logs[0].items[0].source, IntakeSource::Ingredient(_)));

        let everyone = store.intake_logs(range, None).await?;
        assert_eq!(everyone.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_recipe_reference_is_unresolved() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store
            .insert_intake_log(None, at, vec![NewIntakeItem::recipe(999, LoggedAmount::default())])
            .await;
        let range = TimeRange::new(at - Duration::hours(1), at + Duration::hours(1));
        let logs = store.intake_logs(range, None).await?;
        assert_eq!(logs[0].items[0].source, IntakeSource::Unresolved);
        Ok(())
    }

    #[tokio::test]
    async fn test_user_selection() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert!(store.user(UserSelector::First).await?.is_none());
        let first = store.insert_user(Some(41), Some(Sex::Male), None).await;
        let second = store.insert_user(None, None, Some("Europe/Paris")).await;
        assert_eq!(store.user(UserSelector::First).await?.map(|u| u.id), Some(first));
        let user = store.user(UserSelector::Id(second)).await?;
        assert_eq!(user.and_then(|u| u.timezone), Some("Europe/Paris".to_string()));
        Ok(())
    }
}
