use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;

use nutrient_tracker::config::TrackerConfig;
use nutrient_tracker::intake::IntakeAggregator;
use nutrient_tracker::nutrient_model::{NutrientKey, NutrientTotals};
use nutrient_tracker::rdi::StaticRdiTable;
use nutrient_tracker::record_types::{CustomNutrition, LoggedAmount, Sex};
use nutrient_tracker::reference_data::ReferenceData;
use nutrient_tracker::store::{MemoryStore, NewIntakeItem, RecordStore};
use nutrient_tracker::summary::Timeframe;
use nutrient_tracker::tracker::{DashboardRequest, NutritionTracker};
use nutrient_tracker::unit_conversions::ConversionTable;

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn reference() -> Result<Arc<ReferenceData>> {
    let table = ConversionTable::from_json_str(r#"{ "apple_顆_g": 150 }"#)?;
    Ok(Arc::new(ReferenceData::with_tables(table, StaticRdiTable::unset())))
}

fn calories(kcal: f64) -> NutrientTotals {
    NutrientTotals::zero().with(NutrientKey::Calories, Some(kcal))
}

/// Porridge: 800 kcal in 4 servings
async fn porridge(store: &MemoryStore) -> i64 {
    let oats = store.insert_ingredient("Oats", None, Some("g")).await;
    store.add_nutrition_fact(oats, 100.0, "g", calories(400.0)).await;
    let recipe = store.insert_recipe("Porridge", Some(4.0)).await;
    store.add_recipe_line(recipe, oats, Some(200.0), Some("g")).await;
    recipe
}

fn protein_bar() -> CustomNutrition {
    CustomNutrition {
        base_amount_value: 1.0,
        base_amount_unit: "bar".to_string(),
        nutrients: calories(210.0).with(NutrientKey::Protein, Some(20.0)),
    }
}

#[tokio::test]
async fn test_recipe_servings_and_whole_amounts() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let recipe = porridge(&store).await;
    let aggregator = IntakeAggregator::new(Arc::clone(&store), reference()?);

    store
        .insert_intake_log(
            None,
            at(2024, 5, 10, 1),
            vec![NewIntakeItem::recipe(recipe, LoggedAmount::new(1.5, "servings"))],
        )
        .await;
    let servings = aggregator
        .aggregate(None, at(2024, 5, 10, 0), at(2024, 5, 10, 2))
        .await?;
    assert_eq!(servings.get(NutrientKey::Calories), Some(300.0));

    // A non-serving unit scales the whole recipe
    store
        .insert_intake_log(
            None,
            at(2024, 5, 10, 3),
            vec![NewIntakeItem::recipe(recipe, LoggedAmount::new(0.5, "pot"))],
        )
        .await;
    let whole = aggregator
        .aggregate(None, at(2024, 5, 10, 2), at(2024, 5, 10, 4))
        .await?;
    assert_eq!(whole.get(NutrientKey::Calories), Some(400.0));

    // No amount at all means one whole recipe
    store
        .insert_intake_log(
            None,
            at(2024, 5, 10, 5),
            vec![NewIntakeItem::recipe(recipe, LoggedAmount::default())],
        )
        .await;
    let default = aggregator
        .aggregate(None, at(2024, 5, 10, 4), at(2024, 5, 10, 6))
        .await?;
    assert_eq!(default.get(NutrientKey::Calories), Some(800.0));

    let all = aggregator
        .aggregate(None, at(2024, 5, 10, 0), at(2024, 5, 11, 0))
        .await?;
    assert_eq!(all.get(NutrientKey::Calories), Some(1500.0));

    // The recipe totals were cached along the way
    assert!(store.recipe_totals(recipe).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_empty_range_is_zero() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let recipe = porridge(&store).await;
    store
        .insert_intake_log(
            None,
            at(2024, 5, 10, 12),
            vec![NewIntakeItem::recipe(recipe, LoggedAmount::new(1.0, "serving"))],
        )
        .await;
    let aggregator = IntakeAggregator::new(Arc::clone(&store), reference()?);

    let totals = aggregator
        .aggregate(None, at(2024, 5, 9, 0), at(2024, 5, 10, 12))
        .await?;
    assert_eq!(totals, NutrientTotals::zero());
    Ok(())
}

#[tokio::test]
async fn test_ingredient_and_custom_items() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let apple = store.insert_ingredient("Apple", Some("fruit"), None).await;
    store
        .add_nutrition_fact(apple, 100.0, "g", calories(52.0).with(NutrientKey::Protein, Some(0.0)))
        .await;
    store
        .insert_intake_log(
            None,
            at(2024, 5, 10, 8),
            vec![
                NewIntakeItem::ingredient(apple, LoggedAmount::new(1.0, "顆")),
                NewIntakeItem::custom(protein_bar(), LoggedAmount::new(2.0, "Bar")),
            ],
        )
        .await;
    let aggregator = IntakeAggregator::new(Arc::clone(&store), reference()?);

    let totals = aggregator
        .aggregate(None, at(2024, 5, 10, 0), at(2024, 5, 11, 0))
        .await?;
    assert_eq!(totals.get(NutrientKey::Calories), Some(78.0 + 420.0));
    assert_eq!(totals.get(NutrientKey::Protein), Some(40.0));
    Ok(())
}

#[tokio::test]
async fn test_unresolved_item_is_unknown() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let recipe = porridge(&store).await;
    store
        .insert_intake_log(
            None,
            at(2024, 5, 10, 8),
            vec![
                NewIntakeItem::recipe(recipe, LoggedAmount::new(1.0, "serving")),
                NewIntakeItem::recipe(9_999, LoggedAmount::new(1.0, "serving")),
            ],
        )
        .await;
    let aggregator = IntakeAggregator::new(Arc::clone(&store), reference()?);

    let totals = aggregator
        .aggregate(None, at(2024, 5, 10, 0), at(2024, 5, 11, 0))
        .await?;
    assert!(totals.is_unknown());
    Ok(())
}

#[tokio::test]
async fn test_aggregate_per_user() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let alice = store.insert_user(Some(34), Some(Sex::Female), None).await;
    let bob = store.insert_user(Some(41), Some(Sex::Male), None).await;
    for (user, bars) in [(alice, 1.0), (bob, 3.0)] {
        store
            .insert_intake_log(
                Some(user),
                at(2024, 5, 10, 8),
                vec![NewIntakeItem::custom(protein_bar(), LoggedAmount::new(bars, "bar"))],
            )
            .await;
    }
    let aggregator = IntakeAggregator::new(Arc::clone(&store), reference()?);
    let (start, end) = (at(2024, 5, 10, 0), at(2024, 5, 11, 0));

    let alice_totals = aggregator.aggregate(Some(alice), start, end).await?;
    assert_eq!(alice_totals.get(NutrientKey::Calories), Some(210.0));
    let everyone = aggregator.aggregate(None, start, end).await?;
    assert_eq!(everyone.get(NutrientKey::Calories), Some(840.0));
    Ok(())
}

fn tracker_config() -> TrackerConfig {
    TrackerConfig::with_data_dir(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data"))
}

#[tokio::test]
async fn test_daily_dashboard() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let user = store.insert_user(Some(40), Some(Sex::Male), Some("Asia/Taipei")).await;
    let recipe = porridge(&store).await;
    // 11:00 local on May 10th
    store
        .insert_intake_log(
            Some(user),
            at(2024, 5, 10, 3),
            vec![NewIntakeItem::recipe(recipe, LoggedAmount::new(4.0, "servings"))],
        )
        .await;
    // 00:30 local on May 11th
    store
        .insert_intake_log(
            Some(user),
            Utc.with_ymd_and_hms(2024, 5, 10, 16, 30, 0).unwrap(),
            vec![NewIntakeItem::custom(protein_bar(), LoggedAmount::new(1.0, "bar"))],
        )
        .await;
    let tracker = NutritionTracker::new(Arc::clone(&store), tracker_config());

    let mut request = DashboardRequest::new(Timeframe::Daily);
    request.date = Some(day(2024, 5, 10));
    request.user_id = Some(user);
    let report = tracker.dashboard(&request).await?;

    assert_eq!(report.user_id, Some(user));
    assert_eq!(report.sex, Sex::Male);
    assert_eq!(report.timezone, "Asia/Taipei");
    assert_eq!(report.range.start, at(2024, 5, 9, 16));
    assert_eq!(report.range.end, at(2024, 5, 10, 16));
    assert_eq!(report.intake.get(NutrientKey::Calories), Some(800.0));

    let entry = &report.totals["calories_kcal"];
    assert_eq!(entry.display, "800");
    assert_eq!(entry.percent_display, "32");
    assert_eq!(entry.region.as_deref(), Some("CSV"));
    assert!(!entry.is_over_limit);
    assert_eq!(report.rdi.daily["calories_kcal"], Some(2500.0));
    assert_eq!(report.rdi.weekly["calories_kcal"], Some(17500.0));

    // Oats were recorded with zero sodium, which is known and reads 0
    assert_eq!(report.totals["sodium_mg"].display, "0");
    assert!(report.over_limit().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_weekly_dashboard_flags_excess() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let user = store.insert_user(None, None, None).await;
    let feast = CustomNutrition {
        base_amount_value: 1.0,
        base_amount_unit: "plate".to_string(),
        nutrients: calories(10_000.0).with(NutrientKey::Sodium, Some(8_000.0)),
    };
    for offset in 0..3 {
        store
            .insert_intake_log(
                Some(user),
                at(2024, 5, 8 + offset, 4),
                vec![NewIntakeItem::custom(feast.clone(), LoggedAmount::default())],
            )
            .await;
    }
    let tracker = NutritionTracker::new(Arc::clone(&store), tracker_config());

    let mut request = DashboardRequest::new(Timeframe::Weekly);
    request.date = Some(day(2024, 5, 12));
    let report = tracker.dashboard(&request).await?;

    // The first stored user with default sex and timezone
    assert_eq!(report.user_id, Some(user));
    assert_eq!(report.sex, Sex::Female);
    assert_eq!(report.range.start_date, day(2024, 5, 6));
    assert_eq!(report.range.end_date, day(2024, 5, 12));
    assert_eq!(report.intake.get(NutrientKey::Calories), Some(30_000.0));

    // 30000 kcal of a 14000 kcal weekly target
    let entry = &report.totals["calories_kcal"];
    assert_eq!(entry.percent_display, "214.3");
    assert!(entry.is_over_limit);
    assert_eq!(report.over_limit(), vec!["calories_kcal", "sodium_mg"]);
    Ok(())
}
