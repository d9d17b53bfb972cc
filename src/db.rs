//! # Database Module
//!
//! PostgreSQL persistence for ingredients, recipes, intake logs, RDI standards
//! and the recipe totals cache, plus [`PgStore`], the [`RecordStore`] backed by
//! it.
//!
//! Nutrient amounts are stored one nullable `DOUBLE PRECISION` column per
//! nutrient, named after [`NutrientKey::field_name`]. A `NULL` column is an
//! unknown amount.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::nutrient_model::{NutrientKey, NutrientTotals};
use crate::record_types::{
    CustomNutrition, Ingredient, IngredientFilter, IngredientWithFacts, IntakeItem, IntakeLog,
    IntakeSource, LoggedAmount, NutritionFact, RdiStandard, Recipe, RecipeLine,
    RecipeTotalsRecord, RecipeWithIngredients, Sex, TimeRange, UserProfile, UserSelector,
};
use crate::store::{NewIntakeItem, NewIntakeSource, RecordStore};

lazy_static! {
    /// `calories_kcal, protein_g, ...`
    static ref NUTRIENT_COLUMNS: String = NutrientKey::ALL
        .iter()
        .map(|key| key.field_name())
        .collect::<Vec<_>>()
        .join(", ");
    /// Column definitions for the nutrient vector
    static ref NUTRIENT_COLUMN_DEFS: String = NutrientKey::ALL
        .iter()
        .map(|key| format!("{} DOUBLE PRECISION", key.field_name()))
        .collect::<Vec<_>>()
        .join(",\n            ");
    /// `c.calories_kcal, c.protein_g, ...` for joined custom nutrition rows
    static ref CUSTOM_NUTRIENT_COLUMNS: String = NutrientKey::ALL
        .iter()
        .map(|key| format!("c.{}", key.field_name()))
        .collect::<Vec<_>>()
        .join(", ");
}

/// `$first, $first+1, ...` for the nutrient columns
fn nutrient_placeholders(first: usize) -> String {
    (first..first + NutrientKey::ALL.len())
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn nutrients_from_row(row: &PgRow) -> Result<NutrientTotals> {
    let mut totals = NutrientTotals::unknown();
    for key in NutrientKey::ALL {
        let value: Option<f64> = row
            .try_get(key.field_name())
            .with_context(|| format!("Failed to read nutrient column {}", key.field_name()))?;
        totals.set(key, value);
    }
    Ok(totals)
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    let statements = [
        (
            "users",
            "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            age INTEGER,
            sex TEXT CHECK (sex IN ('male', 'female')),
            timezone TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
            .to_string(),
        ),
        (
            "ingredients",
            "CREATE TABLE IF NOT EXISTS ingredients (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            category TEXT,
            default_unit TEXT
        )"
            .to_string(),
        ),
        (
            "nutrition_facts",
            format!(
                "CREATE TABLE IF NOT EXISTS nutrition_facts (
            id BIGSERIAL PRIMARY KEY,
            ingredient_id BIGINT NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
            per_amount_value DOUBLE PRECISION NOT NULL,
            per_amount_unit TEXT NOT NULL,
            {},
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
                *NUTRIENT_COLUMN_DEFS
            ),
        ),
        (
            "recipes",
            "CREATE TABLE IF NOT EXISTS recipes (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            servings DOUBLE PRECISION
        )"
            .to_string(),
        ),
        (
            "recipe_ingredients",
            "CREATE TABLE IF NOT EXISTS recipe_ingredients (
            id BIGSERIAL PRIMARY KEY,
            recipe_id BIGINT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            ingredient_id BIGINT NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
            line_order INTEGER NOT NULL,
            quantity DOUBLE PRECISION,
            unit TEXT
        )"
            .to_string(),
        ),
        (
            "recipe_totals",
            "CREATE TABLE IF NOT EXISTS recipe_totals (
            recipe_id BIGINT PRIMARY KEY REFERENCES recipes(id) ON DELETE CASCADE,
            payload TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
            .to_string(),
        ),
        (
            "intake_logs",
            "CREATE TABLE IF NOT EXISTS intake_logs (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
            logged_at TIMESTAMPTZ NOT NULL
        )"
            .to_string(),
        ),
        (
            "intake_items",
            "CREATE TABLE IF NOT EXISTS intake_items (
            id BIGSERIAL PRIMARY KEY,
            intake_log_id BIGINT NOT NULL REFERENCES intake_logs(id) ON DELETE CASCADE,
            recipe_id BIGINT REFERENCES recipes(id) ON DELETE SET NULL,
            ingredient_id BIGINT REFERENCES ingredients(id) ON DELETE SET NULL,
            amount_value DOUBLE PRECISION,
            amount_unit TEXT
        )"
            .to_string(),
        ),
        (
            "custom_nutrition",
            format!(
                "CREATE TABLE IF NOT EXISTS custom_nutrition (
            id BIGSERIAL PRIMARY KEY,
            intake_item_id BIGINT NOT NULL UNIQUE REFERENCES intake_items(id) ON DELETE CASCADE,
            base_amount_value DOUBLE PRECISION NOT NULL,
            base_amount_unit TEXT NOT NULL,
            {}
        )",
                *NUTRIENT_COLUMN_DEFS
            ),
        ),
        (
            "rdi_standards",
            "CREATE TABLE IF NOT EXISTS rdi_standards (
            id BIGSERIAL PRIMARY KEY,
            nutrient TEXT NOT NULL,
            unit TEXT NOT NULL,
            male_value DOUBLE PRECISION,
            female_value DOUBLE PRECISION,
            source TEXT,
            region TEXT
        )"
            .to_string(),
        ),
    ];

    for (table, statement) in &statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {table} table"))?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_intake_logs_logged_at ON intake_logs(logged_at)")
        .execute(pool)
        .await
        .context("Failed to create intake log index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Connect a pool to `database_url`
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Create a user
pub async fn create_user(
    pool: &PgPool,
    age: Option<u32>,
    sex: Option<Sex>,
    timezone: Option<&str>,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (age, sex, timezone) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(age.and_then(|age| i32::try_from(age).ok()))
    .bind(sex.map(Sex::as_str))
    .bind(timezone)
    .fetch_one(pool)
    .await
    .context("Failed to insert new user")?;

    info!("User created with ID: {}", id);
    Ok(id)
}

fn row_to_user(row: &PgRow) -> Result<UserProfile> {
    let age: Option<i32> = row.try_get("age").context("Failed to read user age")?;
    let sex: Option<String> = row.try_get("sex").context("Failed to read user sex")?;
    Ok(UserProfile {
        id: row.try_get("id").context("Failed to read user id")?,
        age: age.and_then(|age| u32::try_from(age).ok()),
        sex: sex.and_then(|sex| sex.parse().ok()),
        timezone: row.try_get("timezone").context("Failed to read user timezone")?,
    })
}

/// Read a user by id, or the user with the lowest id
pub async fn read_user(pool: &PgPool, selector: UserSelector) -> Result<Option<UserProfile>> {
    let row = match selector {
        UserSelector::Id(id) => {
            sqlx::query("SELECT id, age, sex, timezone FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await
        }
        UserSelector::First => {
            sqlx::query("SELECT id, age, sex, timezone FROM users ORDER BY id ASC LIMIT 1")
                .fetch_optional(pool)
                .await
        }
    }
    .context("Failed to read user")?;

    row.as_ref().map(row_to_user).transpose()
}

/// Create an ingredient
pub async fn create_ingredient(
    pool: &PgPool,
    name: &str,
    category: Option<&str>,
    default_unit: Option<&str>,
) -> Result<i64> {
    info!("Creating ingredient: {}", name);

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO ingredients (name, category, default_unit) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(category)
    .bind(default_unit)
    .fetch_one(pool)
    .await
    .context("Failed to insert new ingredient")?;

    info!("Ingredient created with ID: {}", id);
    Ok(id)
}

/// Add a nutrition fact to an ingredient
pub async fn create_nutrition_fact(
    pool: &PgPool,
    ingredient_id: i64,
    per_amount_value: f64,
    per_amount_unit: &str,
    nutrients: &NutrientTotals,
) -> Result<i64> {
    let sql = format!(
        "INSERT INTO nutrition_facts (ingredient_id, per_amount_value, per_amount_unit, {})
         VALUES ($1, $2, $3, {}) RETURNING id",
        *NUTRIENT_COLUMNS,
        nutrient_placeholders(4)
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql)
        .bind(ingredient_id)
        .bind(per_amount_value)
        .bind(per_amount_unit);
    for (_, value) in nutrients.iter() {
        query = query.bind(value);
    }
    let id = query
        .fetch_one(pool)
        .await
        .context("Failed to insert nutrition fact")?;

    info!("Nutrition fact {} added to ingredient {}", id, ingredient_id);
    Ok(id)
}

fn row_to_ingredient(row: &PgRow) -> Result<Ingredient> {
    Ok(Ingredient {
        id: row.try_get("id").context("Failed to read ingredient id")?,
        name: row.try_get("name").context("Failed to read ingredient name")?,
        category: row.try_get("category").context("Failed to read ingredient category")?,
        default_unit: row
            .try_get("default_unit")
            .context("Failed to read ingredient default unit")?,
    })
}

/// All nutrition facts of an ingredient, newest first
pub async fn read_nutrition_facts(pool: &PgPool, ingredient_id: i64) -> Result<Vec<NutritionFact>> {
    let sql = format!(
        "SELECT id, ingredient_id, per_amount_value, per_amount_unit, {}, created_at
         FROM nutrition_facts WHERE ingredient_id = $1
         ORDER BY created_at DESC, id DESC",
        *NUTRIENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(ingredient_id)
        .fetch_all(pool)
        .await
        .context("Failed to read nutrition facts")?;

    rows.iter()
        .map(|row| -> Result<NutritionFact> {
            Ok(NutritionFact {
                id: row.try_get("id").context("Failed to read fact id")?,
                ingredient_id: row.try_get("ingredient_id").context("Failed to read fact ingredient")?,
                per_amount_value: row
                    .try_get("per_amount_value")
                    .context("Failed to read fact amount")?,
                per_amount_unit: row
                    .try_get("per_amount_unit")
                    .context("Failed to read fact unit")?,
                nutrients: nutrients_from_row(row)?,
                created_at: row.try_get("created_at").context("Failed to read fact timestamp")?,
            })
        })
        .collect()
}

async fn with_facts(pool: &PgPool, ingredient: Ingredient) -> Result<IngredientWithFacts> {
    let facts = read_nutrition_facts(pool, ingredient.id).await?;
    Ok(IngredientWithFacts { ingredient, facts })
}

/// Read an ingredient with its facts
pub async fn read_ingredient(pool: &PgPool, ingredient_id: i64) -> Result<Option<IngredientWithFacts>> {
    debug!("Reading ingredient with ID: {}", ingredient_id);

    let row = sqlx::query("SELECT id, name, category, default_unit FROM ingredients WHERE id = $1")
        .bind(ingredient_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read ingredient")?;

    match row {
        Some(row) => Ok(Some(with_facts(pool, row_to_ingredient(&row)?).await?)),
        None => Ok(None),
    }
}

/// Read an ingredient by its unique name
pub async fn read_ingredient_by_name(pool: &PgPool, name: &str) -> Result<Option<IngredientWithFacts>> {
    let row = sqlx::query("SELECT id, name, category, default_unit FROM ingredients WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to read ingredient by name")?;

    match row {
        Some(row) => Ok(Some(with_facts(pool, row_to_ingredient(&row)?).await?)),
        None => Ok(None),
    }
}

/// List ingredients matching a filter, ordered by name
pub async fn list_ingredients(pool: &PgPool, filter: &IngredientFilter) -> Result<Vec<Ingredient>> {
    let rows = sqlx::query(
        "SELECT id, name, category, default_unit FROM ingredients
         WHERE ($1::TEXT IS NULL OR POSITION(LOWER($1) IN LOWER(name)) > 0)
           AND ($2::TEXT IS NULL OR category = $2)
         ORDER BY name",
    )
    .bind(filter.name_contains.as_deref())
    .bind(filter.category.as_deref())
    .fetch_all(pool)
    .await
    .context("Failed to list ingredients")?;

    rows.iter().map(row_to_ingredient).collect()
}

/// Create a recipe
pub async fn create_recipe(pool: &PgPool, name: &str, servings: Option<f64>) -> Result<i64> {
    info!("Creating recipe: {}", name);

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO recipes (name, servings) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(servings)
    .fetch_one(pool)
    .await
    .context("Failed to insert new recipe")?;

    info!("Recipe created with ID: {}", id);
    Ok(id)
}

/// Append an ingredient line to a recipe
///
/// Changing a recipe's lines leaves its cached totals stale; callers
/// invalidate them through the totals engine.
pub async fn add_recipe_ingredient(
    pool: &PgPool,
    recipe_id: i64,
    ingredient_id: i64,
    quantity: Option<f64>,
    unit: Option<&str>,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, line_order, quantity, unit)
         VALUES ($1, $2,
                 (SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = $1)::INTEGER,
                 $3, $4)
         RETURNING id",
    )
    .bind(recipe_id)
    .bind(ingredient_id)
    .bind(quantity)
    .bind(unit)
    .fetch_one(pool)
    .await
    .context("Failed to insert recipe ingredient")?;

    info!("Ingredient {} added to recipe {}", ingredient_id, recipe_id);
    Ok(id)
}

fn row_to_recipe(row: &PgRow) -> Result<Recipe> {
    Ok(Recipe {
        id: row.try_get("id").context("Failed to read recipe id")?,
        name: row.try_get("name").context("Failed to read recipe name")?,
        servings: row.try_get("servings").context("Failed to read recipe servings")?,
    })
}

/// Read a recipe by its unique name
pub async fn read_recipe_by_name(pool: &PgPool, name: &str) -> Result<Option<Recipe>> {
    let row = sqlx::query("SELECT id, name, servings FROM recipes WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to read recipe by name")?;

    row.as_ref().map(row_to_recipe).transpose()
}

/// Read a recipe with its lines, their ingredients and facts, and its raw
/// cached totals
pub async fn read_recipe_with_ingredients(
    pool: &PgPool,
    recipe_id: i64,
) -> Result<Option<RecipeWithIngredients>> {
    debug!("Reading recipe with ID: {}", recipe_id);

    let row = sqlx::query(
        "SELECT r.id, r.name, r.servings, t.payload
         FROM recipes r LEFT JOIN recipe_totals t ON t.recipe_id = r.id
         WHERE r.id = $1",
    )
    .bind(recipe_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read recipe")?;

    let Some(row) = row else {
        debug!("No recipe found with ID: {}", recipe_id);
        return Ok(None);
    };
    let recipe = row_to_recipe(&row)?;
    let cached_totals: Option<String> = row.try_get("payload").context("Failed to read cached totals")?;

    let line_rows = sqlx::query(
        "SELECT l.quantity, l.unit, i.id, i.name, i.category, i.default_unit
         FROM recipe_ingredients l JOIN ingredients i ON i.id = l.ingredient_id
         WHERE l.recipe_id = $1
         ORDER BY l.line_order, l.id",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .context("Failed to read recipe ingredients")?;

    let mut lines = Vec::with_capacity(line_rows.len());
    for line in &line_rows {
        let ingredient = with_facts(pool, row_to_ingredient(line)?).await?;
        lines.push(RecipeLine {
            ingredient,
            quantity: line.try_get("quantity").context("Failed to read line quantity")?,
            unit: line.try_get("unit").context("Failed to read line unit")?,
        });
    }

    Ok(Some(RecipeWithIngredients {
        recipe,
        lines,
        cached_totals,
    }))
}

/// Read the cached totals of a recipe
pub async fn read_recipe_totals(pool: &PgPool, recipe_id: i64) -> Result<Option<RecipeTotalsRecord>> {
    let row = sqlx::query("SELECT recipe_id, payload, updated_at FROM recipe_totals WHERE recipe_id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read recipe totals")?;

    row.map(|row| -> Result<RecipeTotalsRecord> {
        Ok(RecipeTotalsRecord {
            recipe_id: row.try_get("recipe_id").context("Failed to read totals recipe id")?,
            payload: row.try_get("payload").context("Failed to read totals payload")?,
            updated_at: row.try_get("updated_at").context("Failed to read totals timestamp")?,
        })
    })
    .transpose()
}

/// Insert or overwrite the cached totals of a recipe
pub async fn upsert_recipe_totals(pool: &PgPool, recipe_id: i64, payload: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_totals (recipe_id, payload, updated_at) VALUES ($1, $2, NOW())
         ON CONFLICT (recipe_id) DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()",
    )
    .bind(recipe_id)
    .bind(payload)
    .execute(pool)
    .await
    .context("Failed to upsert recipe totals")?;

    info!("Recipe totals stored for recipe {}", recipe_id);
    Ok(())
}

/// Delete the cached totals of a recipe; returns whether a row existed
pub async fn delete_recipe_totals(pool: &PgPool, recipe_id: i64) -> Result<bool> {
    let rows_affected = sqlx::query("DELETE FROM recipe_totals WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(pool)
        .await
        .context("Failed to delete recipe totals")?
        .rows_affected();

    if rows_affected > 0 {
        info!("Recipe totals invalidated for recipe {}", recipe_id);
    }
    Ok(rows_affected > 0)
}

/// Create an intake log with its items in one transaction
pub async fn create_intake_log(
    pool: &PgPool,
    user_id: Option<i64>,
    logged_at: DateTime<Utc>,
    items: &[NewIntakeItem],
) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let log_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO intake_logs (user_id, logged_at) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(logged_at)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to insert intake log")?;

    let custom_sql = format!(
        "INSERT INTO custom_nutrition (intake_item_id, base_amount_value, base_amount_unit, {})
         VALUES ($1, $2, $3, {})",
        *NUTRIENT_COLUMNS,
        nutrient_placeholders(4)
    );

    for item in items {
        let (recipe_id, ingredient_id) = match &item.source {
            NewIntakeSource::Recipe(id) => (Some(*id), None),
            NewIntakeSource::Ingredient(id) => (None, Some(*id)),
            NewIntakeSource::Custom(_) => (None, None),
        };
        let item_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO intake_items (intake_log_id, recipe_id, ingredient_id, amount_value, amount_unit)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(log_id)
        .bind(recipe_id)
        .bind(ingredient_id)
        .bind(item.amount.value)
        .bind(item.amount.unit.as_deref())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert intake item")?;

        if let NewIntakeSource::Custom(custom) = &item.source {
            let mut query = sqlx::query(&custom_sql)
                .bind(item_id)
                .bind(custom.base_amount_value)
                .bind(custom.base_amount_unit.as_str());
            for (_, value) in custom.nutrients.iter() {
                query = query.bind(value);
            }
            query
                .execute(&mut *tx)
                .await
                .context("Failed to insert custom nutrition")?;
        }
    }

    tx.commit().await.context("Failed to commit intake log")?;
    info!("Intake log {} created with {} items", log_id, items.len());
    Ok(log_id)
}

async fn read_intake_items(pool: &PgPool, log_id: i64) -> Result<Vec<IntakeItem>> {
    let sql = format!(
        "SELECT i.id AS item_id, i.recipe_id, i.ingredient_id, i.amount_value, i.amount_unit,
                c.id AS custom_id, c.base_amount_value, c.base_amount_unit, {}
         FROM intake_items i LEFT JOIN custom_nutrition c ON c.intake_item_id = i.id
         WHERE i.intake_log_id = $1
         ORDER BY i.id",
        *CUSTOM_NUTRIENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(log_id)
        .fetch_all(pool)
        .await
        .context("Failed to read intake items")?;

    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        let custom_id: Option<i64> = row.try_get("custom_id").context("Failed to read custom id")?;
        let custom = match custom_id {
            Some(_) => Some(CustomNutrition {
                base_amount_value: row
                    .try_get("base_amount_value")
                    .context("Failed to read custom base amount")?,
                base_amount_unit: row
                    .try_get("base_amount_unit")
                    .context("Failed to read custom base unit")?,
                nutrients: nutrients_from_row(row)?,
            }),
            None => None,
        };

        // Custom nutrition wins, so references are only followed without it
        let (recipe, ingredient) = if custom.is_some() {
            (None, None)
        } else {
            let recipe_id: Option<i64> = row.try_get("recipe_id").context("Failed to read item recipe")?;
            let ingredient_id: Option<i64> = row
                .try_get("ingredient_id")
                .context("Failed to read item ingredient")?;
            let recipe = match recipe_id {
                Some(id) => read_recipe_with_ingredients(pool, id).await?,
                None => None,
            };
            let ingredient = match (recipe.is_none(), ingredient_id) {
                (true, Some(id)) => read_ingredient(pool, id).await?,
                _ => None,
            };
            (recipe, ingredient)
        };

        items.push(IntakeItem {
            id: row.try_get("item_id").context("Failed to read item id")?,
            source: IntakeSource::from_parts(custom, recipe, ingredient),
            amount: LoggedAmount {
                value: row.try_get("amount_value").context("Failed to read item amount")?,
                unit: row.try_get("amount_unit").context("Failed to read item unit")?,
            },
        });
    }
    Ok(items)
}

/// Read intake logs in a time range, oldest first, with resolved items
pub async fn read_intake_logs(
    pool: &PgPool,
    range: TimeRange,
    user_id: Option<i64>,
) -> Result<Vec<IntakeLog>> {
    let rows = sqlx::query(
        "SELECT id, user_id, logged_at FROM intake_logs
         WHERE logged_at >= $1 AND logged_at < $2
           AND ($3::BIGINT IS NULL OR user_id = $3)
         ORDER BY logged_at ASC, id ASC",
    )
    .bind(range.start)
    .bind(range.end)
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to read intake logs")?;

    let mut logs = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.try_get("id").context("Failed to read log id")?;
        logs.push(IntakeLog {
            id,
            user_id: row.try_get("user_id").context("Failed to read log user")?,
            logged_at: row.try_get("logged_at").context("Failed to read log timestamp")?,
            items: read_intake_items(pool, id).await?,
        });
    }
    debug!("Read {} intake logs between {} and {}", logs.len(), range.start, range.end);
    Ok(logs)
}

/// Create a dynamic RDI standard row
pub async fn create_rdi_standard(pool: &PgPool, standard: &RdiStandard) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO rdi_standards (nutrient, unit, male_value, female_value, source, region)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(&standard.nutrient)
    .bind(&standard.unit)
    .bind(standard.male_value)
    .bind(standard.female_value)
    .bind(standard.source.as_deref())
    .bind(standard.region.as_deref())
    .fetch_one(pool)
    .await
    .context("Failed to insert RDI standard")?;

    info!("RDI standard created for {}", standard.nutrient);
    Ok(id)
}

/// All dynamic RDI standard rows
pub async fn list_rdi_standards(pool: &PgPool) -> Result<Vec<RdiStandard>> {
    let rows = sqlx::query(
        "SELECT nutrient, unit, male_value, female_value, source, region
         FROM rdi_standards ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list RDI standards")?;

    rows.iter()
        .map(|row| -> Result<RdiStandard> {
            Ok(RdiStandard {
                nutrient: row.try_get("nutrient").context("Failed to read RDI nutrient")?,
                unit: row.try_get("unit").context("Failed to read RDI unit")?,
                male_value: row.try_get("male_value").context("Failed to read RDI male value")?,
                female_value: row
                    .try_get("female_value")
                    .context("Failed to read RDI female value")?,
                source: row.try_get("source").context("Failed to read RDI source")?,
                region: row.try_get("region").context("Failed to read RDI region")?,
            })
        })
        .collect()
}

/// Record store over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = connect(database_url).await?;
        init_database_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ingredient_by_id(&self, id: i64) -> crate::errors::Result<Option<IngredientWithFacts>> {
        Ok(read_ingredient(&self.pool, id).await?)
    }

    async fn ingredient_by_name(&self, name: &str) -> crate::errors::Result<Option<IngredientWithFacts>> {
        Ok(read_ingredient_by_name(&self.pool, name).await?)
    }

    async fn list_ingredients(&self, filter: &IngredientFilter) -> crate::errors::Result<Vec<Ingredient>> {
        Ok(list_ingredients(&self.pool, filter).await?)
    }

    async fn nutrition_facts(&self, ingredient_id: i64) -> crate::errors::Result<Vec<NutritionFact>> {
        Ok(read_nutrition_facts(&self.pool, ingredient_id).await?)
    }

    async fn recipe_with_ingredients(&self, id: i64) -> crate::errors::Result<Option<RecipeWithIngredients>> {
        Ok(read_recipe_with_ingredients(&self.pool, id).await?)
    }

    async fn recipe_by_name(&self, name: &str) -> crate::errors::Result<Option<Recipe>> {
        Ok(read_recipe_by_name(&self.pool, name).await?)
    }

    async fn recipe_totals(&self, recipe_id: i64) -> crate::errors::Result<Option<RecipeTotalsRecord>> {
        Ok(read_recipe_totals(&self.pool, recipe_id).await?)
    }

    async fn upsert_recipe_totals(&self, recipe_id: i64, payload: &str) -> crate::errors::Result<()> {
        Ok(upsert_recipe_totals(&self.pool, recipe_id, payload).await?)
    }

    async fn delete_recipe_totals(&self, recipe_id: i64) -> crate::errors::Result<()> {
        delete_recipe_totals(&self.pool, recipe_id).await?;
        Ok(())
    }

    async fn intake_logs(
        &self,
        range: TimeRange,
        user_id: Option<i64>,
    ) -> crate::errors::Result<Vec<IntakeLog>> {
        Ok(read_intake_logs(&self.pool, range, user_id).await?)
    }

    async fn rdi_standards(&self) -> crate::errors::Result<Vec<RdiStandard>> {
        Ok(list_rdi_standards(&self.pool).await?)
    }

    async fn user(&self, selector: UserSelector) -> crate::errors::Result<Option<UserProfile>> {
        Ok(read_user(&self.pool, selector).await?)
    }
}
