//! # RDI Module
//!
//! Recommended daily intake targets per nutrient, and the user context used to
//! pick them.
//!
//! ## Resolution order
//!
//! 1. **Dynamic standards** from the record store, when the store holds any row
//! 2. **Static fallback** table read once from a CSV file
//!
//! Weekly targets are always derived as `daily * 7`. Resolution never fails: a
//! store error moves on to the static table, and an unreadable static table
//! yields a map where every target is unknown.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{NutritionError, Result};
use crate::nutrient_model::{NutrientKey, NUTRIENT_COUNT};
use crate::record_types::{RdiStandard, Sex, UserSelector};
use crate::reference_data::ReferenceData;
use crate::store::RecordStore;

/// Days in the weekly timeframe
pub const DAYS_PER_WEEK: f64 = 7.0;

/// Region tag of records coming from the record store
pub const DYNAMIC_REGION: &str = "DB";
/// Region tag of records coming from the static CSV table
pub const STATIC_REGION: &str = "CSV";

const DYNAMIC_SOURCE: &str = "RdiStandard";
const STATIC_SOURCE: &str = "CSV";

/// Target values for one nutrient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdiRecord {
    #[serde(skip)]
    pub nutrient: NutrientKey,
    pub unit: String,
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub source: Option<String>,
    pub region: Option<String>,
}

impl RdiRecord {
    /// A record with no known target
    pub fn unset(nutrient: NutrientKey, region: &str) -> Self {
        Self {
            nutrient,
            unit: nutrient.unit().to_string(),
            daily: None,
            weekly: None,
            source: None,
            region: Some(region.to_string()),
        }
    }

    /// A record for a daily target; the weekly target is derived
    pub fn from_daily(
        nutrient: NutrientKey,
        unit: &str,
        daily: Option<f64>,
        source: &str,
        region: &str,
    ) -> Self {
        let daily = daily.filter(|value| value.is_finite());
        Self {
            nutrient,
            unit: unit.to_string(),
            daily,
            weekly: daily.map(|value| value * DAYS_PER_WEEK),
            source: Some(source.to_string()),
            region: Some(region.to_string()),
        }
    }
}

/// A record for every nutrient key
#[derive(Debug, Clone, PartialEq)]
pub struct RdiTable {
    records: [RdiRecord; NUTRIENT_COUNT],
}

impl RdiTable {
    /// Every nutrient present with unknown targets
    pub fn unset(region: &str) -> Self {
        Self {
            records: NutrientKey::ALL.map(|key| RdiRecord::unset(key, region)),
        }
    }

    /// Replace the record of its nutrient
    pub fn insert(&mut self, record: RdiRecord) {
        let index = record.nutrient.index();
        self.records[index] = record;
    }

    pub fn get(&self, key: NutrientKey) -> &RdiRecord {
        &self.records[key.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RdiRecord> {
        self.records.iter()
    }

    /// True when at least one daily target is known
    pub fn has_targets(&self) -> bool {
        self.iter().any(|record| record.daily.is_some())
    }

    /// Build from dynamic standard rows for one sex
    ///
    /// Rows naming unknown nutrients are ignored; a later row for the same
    /// nutrient replaces an earlier one.
    pub fn from_standards(standards: &[RdiStandard], sex: Sex) -> Self {
        let mut table = Self::unset(DYNAMIC_REGION);
        for standard in standards {
            let Some(key) = NutrientKey::from_rdi_name(&standard.nutrient) else {
                debug!("Ignoring RDI standard for unknown nutrient {:?}", standard.nutrient);
                continue;
            };
            table.insert(RdiRecord::from_daily(
                key,
                &standard.unit,
                standard.value_for(sex),
                standard.source.as_deref().unwrap_or(DYNAMIC_SOURCE),
                DYNAMIC_REGION,
            ));
        }
        table
    }
}

impl Serialize for RdiTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            map.serialize_entry(record.nutrient.field_name(), record)?;
        }
        map.end()
    }
}

#[derive(Debug, serde::Deserialize)]
struct RdiCsvRow {
    nutrient: String,
    unit: String,
    #[serde(default)]
    adult_male: Option<String>,
    #[serde(default)]
    adult_female: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

fn parse_target(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Static RDI reference table, split by sex
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRdiTable {
    pub males: RdiTable,
    pub females: RdiTable,
}

impl StaticRdiTable {
    /// A table where every target is unknown
    pub fn unset() -> Self {
        Self {
            males: RdiTable::unset(STATIC_REGION),
            females: RdiTable::unset(STATIC_REGION),
        }
    }

    /// Parse CSV text with a `nutrient,unit,adult_male,adult_female,source` header
    ///
    /// Rows that cannot be read or that name an unknown nutrient are skipped;
    /// unparsable values become unknown targets.
    pub fn from_csv_str(raw: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(raw.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| NutritionError::Config(format!("Invalid RDI table header: {e}")))?;
        for required in ["nutrient", "unit"] {
            if !headers.iter().any(|header| header == required) {
                return Err(NutritionError::Config(format!(
                    "RDI table is missing the {required:?} column"
                )));
            }
        }

        let mut table = Self::unset();
        for row in reader.deserialize::<RdiCsvRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    debug!("Skipping unreadable RDI row: {e}");
                    continue;
                }
            };
            let Some(key) = NutrientKey::from_rdi_name(&row.nutrient) else {
                continue;
            };
            let source = row
                .source
                .as_deref()
                .filter(|source| !source.is_empty())
                .unwrap_or(STATIC_SOURCE);
            table.males.insert(RdiRecord::from_daily(
                key,
                &row.unit,
                parse_target(row.adult_male.as_deref()),
                source,
                STATIC_REGION,
            ));
            table.females.insert(RdiRecord::from_daily(
                key,
                &row.unit,
                parse_target(row.adult_female.as_deref()),
                source,
                STATIC_REGION,
            ));
        }
        Ok(table)
    }

    /// Load the table from disk, degrading to an all-unknown table on failure
    pub async fn load(path: &Path) -> Self {
        let loaded = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_csv_str(&raw),
            Err(e) => Err(NutritionError::ReferenceLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        };
        match loaded {
            Ok(table) => {
                info!("Loaded static RDI table from {}", path.display());
                table
            }
            Err(e) => {
                warn!("Static RDI table unavailable, targets will be unknown: {e}");
                Self::unset()
            }
        }
    }

    pub fn for_sex(&self, sex: Sex) -> &RdiTable {
        match sex {
            Sex::Male => &self.males,
            Sex::Female => &self.females,
        }
    }
}

/// One step of RDI resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdiStrategy {
    DynamicStandards,
    StaticFallback,
}

impl RdiStrategy {
    pub const ORDER: [RdiStrategy; 2] = [RdiStrategy::DynamicStandards, RdiStrategy::StaticFallback];
}

/// Resolves RDI targets for a user
pub struct RdiResolver<S: ?Sized> {
    store: Arc<S>,
    reference: Arc<ReferenceData>,
}

impl<S: RecordStore + ?Sized> RdiResolver<S> {
    pub fn new(store: Arc<S>, reference: Arc<ReferenceData>) -> Self {
        Self { store, reference }
    }

    /// Targets for every nutrient
    ///
    /// `age` is accepted for age-tiered tables but not used: both the dynamic
    /// and the static tables are differentiated by sex only.
    pub async fn resolve(&self, age: Option<u32>, sex: Sex) -> RdiTable {
        for strategy in RdiStrategy::ORDER {
            if let Some(table) = self.apply(strategy, sex).await {
                debug!("Resolved RDI for {sex} (age {age:?}) via {strategy:?}");
                return table;
            }
        }
        RdiTable::unset(STATIC_REGION)
    }

    async fn apply(&self, strategy: RdiStrategy, sex: Sex) -> Option<RdiTable> {
        match strategy {
            RdiStrategy::DynamicStandards => match self.store.rdi_standards().await {
                Ok(standards) if !standards.is_empty() => {
                    Some(RdiTable::from_standards(&standards, sex))
                }
                Ok(_) => None,
                Err(e) => {
                    warn!("RDI standards lookup failed, using static table: {e}");
                    None
                }
            },
            RdiStrategy::StaticFallback => {
                let fallback = self.reference.rdi_fallback().await;
                Some(fallback.for_sex(sex).clone())
            }
        }
    }
}

/// Defaults for absent user attributes
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefaults {
    pub age: u32,
    pub sex: Sex,
    pub timezone: String,
}

impl Default for UserDefaults {
    fn default() -> Self {
        Self {
            age: 30,
            sex: Sex::Female,
            timezone: "Asia/Taipei".to_string(),
        }
    }
}

/// Attributes used to pick RDI targets and day ranges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserContext {
    pub user_id: Option<i64>,
    pub age: u32,
    pub sex: Sex,
    pub timezone: String,
}

impl UserContext {
    pub fn from_defaults(defaults: &UserDefaults) -> Self {
        Self {
            user_id: None,
            age: defaults.age,
            sex: defaults.sex,
            timezone: defaults.timezone.clone(),
        }
    }
}

/// Read a user by id, or the first user when no id is given
///
/// Absent attributes take their defaults. A missing user or a store error
/// yields the defaults with no user id.
pub async fn resolve_user_context<S: RecordStore + ?Sized>(
    store: &S,
    user_id: Option<i64>,
    defaults: &UserDefaults,
) -> UserContext {
    let selector = user_id.map_or(UserSelector::First, UserSelector::Id);
    match store.user(selector).await {
        Ok(Some(user)) => UserContext {
            user_id: Some(user.id),
            age: user.age.unwrap_or(defaults.age),
            sex: user.sex.unwrap_or(defaults.sex),
            timezone: user.timezone.unwrap_or_else(|| defaults.timezone.clone()),
        },
        Ok(None) => UserContext::from_defaults(defaults),
        Err(e) => {
            warn!("User lookup failed, using defaults: {e}");
            UserContext::from_defaults(defaults)
        }
    }
}
