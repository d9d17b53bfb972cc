use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use nutrient_tracker::errors;
use nutrient_tracker::nutrient_model::NutrientKey;
use nutrient_tracker::rdi::{resolve_user_context, RdiResolver, UserDefaults, DYNAMIC_REGION, STATIC_REGION};
use nutrient_tracker::record_types::{
    Ingredient, IngredientFilter, IngredientWithFacts, IntakeLog, NutritionFact, RdiStandard,
    Recipe, RecipeTotalsRecord, RecipeWithIngredients, Sex, TimeRange, UserProfile, UserSelector,
};
use nutrient_tracker::reference_data::ReferenceData;
use nutrient_tracker::store::{MemoryStore, RecordStore};

fn shipped_reference() -> Arc<ReferenceData> {
    let data_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    Arc::new(ReferenceData::new(
        data_dir.join("unit-conversions.json"),
        data_dir.join("rdi.csv"),
    ))
}

fn standard(nutrient: &str, unit: &str, male: Option<f64>, female: Option<f64>) -> RdiStandard {
    RdiStandard {
        nutrient: nutrient.to_string(),
        unit: unit.to_string(),
        male_value: male,
        female_value: female,
        source: Some("MOHW".to_string()),
        region: Some("TW".to_string()),
    }
}

/// A store whose every call fails
struct UnavailableStore;

fn unavailable<T>() -> errors::Result<T> {
    Err(anyhow!("connection refused").into())
}

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn ingredient_by_id(&self, _id: i64) -> errors::Result<Option<IngredientWithFacts>> {
        unavailable()
    }

    async fn ingredient_by_name(&self, _name: &str) -> errors::Result<Option<IngredientWithFacts>> {
        unavailable()
    }

    async fn list_ingredients(&self, _filter: &IngredientFilter) -> errors::Result<Vec<Ingredient>> {
        unavailable()
    }

    async fn nutrition_facts(&self, _ingredient_id: i64) -> errors::Result<Vec<NutritionFact>> {
        unavailable()
    }

    async fn recipe_with_ingredients(&self, _id: i64) -> errors::Result<Option<RecipeWithIngredients>> {
        unavailable()
    }

    async fn recipe_by_name(&self, _name: &str) -> errors::Result<Option<Recipe>> {
        unavailable()
    }

    async fn recipe_totals(&self, _recipe_id: i64) -> errors::Result<Option<RecipeTotalsRecord>> {
        unavailable()
    }

    async fn upsert_recipe_totals(&self, _recipe_id: i64, _payload: &str) -> errors::Result<()> {
        unavailable()
    }

    async fn delete_recipe_totals(&self, _recipe_id: i64) -> errors::Result<()> {
        unavailable()
    }

    async fn intake_logs(&self, _range: TimeRange, _user_id: Option<i64>) -> errors::Result<Vec<IntakeLog>> {
        unavailable()
    }

    async fn rdi_standards(&self) -> errors::Result<Vec<RdiStandard>> {
        unavailable()
    }

    async fn user(&self, _selector: UserSelector) -> errors::Result<Option<UserProfile>> {
        unavailable()
    }
}

#[tokio::test]
async fn test_empty_store_uses_static_table() -> Result<()> {
    let resolver = RdiResolver::new(Arc::new(MemoryStore::new()), shipped_reference());

    let males = resolver.resolve(Some(40), Sex::Male).await;
    let calories = males.get(NutrientKey::Calories);
    assert_eq!(calories.daily, Some(2500.0));
    assert_eq!(calories.source.as_deref(), Some("FDA"));
    assert_eq!(calories.region.as_deref(), Some(STATIC_REGION));

    let females = resolver.resolve(None, Sex::Female).await;
    assert_eq!(females.get(NutrientKey::Iron).daily, Some(18.0));
    assert_eq!(females.get(NutrientKey::VitaminA).unit, "mcg");

    for table in [&males, &females] {
        for record in table.iter() {
            assert!(record.daily.is_some(), "{:?} has no daily target", record.nutrient);
            assert_eq!(record.weekly, record.daily.map(|daily| daily * 7.0));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_dynamic_standards_win() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_rdi_standard(standard("calories", "kcal", Some(2400.0), Some(1900.0)))
        .await;
    store
        .insert_rdi_standard(standard("protein", "g", Some(60.0), None))
        .await;
    store
        .insert_rdi_standard(standard("caffeine", "mg", Some(400.0), Some(400.0)))
        .await;
    let resolver = RdiResolver::new(Arc::clone(&store), shipped_reference());

    let females = resolver.resolve(Some(30), Sex::Female).await;
    let calories = females.get(NutrientKey::Calories);
    assert_eq!(calories.daily, Some(1900.0));
    assert_eq!(calories.weekly, Some(13300.0));
    assert_eq!(calories.source.as_deref(), Some("MOHW"));
    assert_eq!(calories.region.as_deref(), Some(DYNAMIC_REGION));

    // Dynamic rows replace the static table entirely, gaps included
    assert_eq!(females.get(NutrientKey::Protein).daily, None);
    assert_eq!(females.get(NutrientKey::Sodium).daily, None);
    assert_eq!(females.get(NutrientKey::Sodium).region.as_deref(), Some(DYNAMIC_REGION));

    let males = resolver.resolve(Some(30), Sex::Male).await;
    assert_eq!(males.get(NutrientKey::Protein).weekly, Some(420.0));
    Ok(())
}

#[tokio::test]
async fn test_store_failure_falls_back() -> Result<()> {
    let store = Arc::new(UnavailableStore);
    let resolver = RdiResolver::new(Arc::clone(&store), shipped_reference());

    let table = resolver.resolve(None, Sex::Male).await;
    assert_eq!(table.get(NutrientKey::Sodium).daily, Some(2300.0));
    assert_eq!(table.get(NutrientKey::Sodium).region.as_deref(), Some(STATIC_REGION));

    let context = resolve_user_context(store.as_ref(), Some(7), &UserDefaults::default()).await;
    assert_eq!(context.user_id, None);
    assert_eq!(context.sex, Sex::Female);
    Ok(())
}

#[tokio::test]
async fn test_missing_reference_file_gives_unknown_targets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let reference = Arc::new(ReferenceData::new(
        dir.path().join("unit-conversions.json"),
        dir.path().join("rdi.csv"),
    ));
    let resolver = RdiResolver::new(Arc::new(MemoryStore::new()), reference);

    let table = resolver.resolve(Some(30), Sex::Female).await;
    assert!(!table.has_targets());
    assert_eq!(table.get(NutrientKey::Calories).unit, "kcal");
    Ok(())
}

#[tokio::test]
async fn test_user_context_defaults() -> Result<()> {
    let store = MemoryStore::new();
    let defaults = UserDefaults::default();

    // No users at all
    let context = resolve_user_context(&store, None, &defaults).await;
    assert_eq!(context.user_id, None);
    assert_eq!(context.age, 30);
    assert_eq!(context.sex, Sex::Female);
    assert_eq!(context.timezone, "Asia/Taipei");

    let first = store.insert_user(Some(52), None, Some("Europe/Paris")).await;
    let second = store.insert_user(None, Some(Sex::Male), None).await;

    let context = resolve_user_context(&store, None, &defaults).await;
    assert_eq!(context.user_id, Some(first));
    assert_eq!(context.age, 52);
    assert_eq!(context.sex, Sex::Female);
    assert_eq!(context.timezone, "Europe/Paris");

    let context = resolve_user_context(&store, Some(second), &defaults).await;
    assert_eq!(context.user_id, Some(second));
    assert_eq!(context.age, 30);
    assert_eq!(context.sex, Sex::Male);
    assert_eq!(context.timezone, "Asia/Taipei");

    // An unknown id does not fall back to another user
    let context = resolve_user_context(&store, Some(first + second + 100), &defaults).await;
    assert_eq!(context.user_id, None);
    Ok(())
}
