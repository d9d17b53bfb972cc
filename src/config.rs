//! # Configuration Module
//!
//! Runtime configuration of the tracker: where the reference tables live, the
//! database to use, and the defaults applied to incomplete user profiles.
//!
//! Values come from the environment (a `.env` file is honored by the binary
//! through `dotenv`), with the defaults below for anything unset.

use std::env;
use std::path::PathBuf;

use crate::errors::{NutritionError, Result};
use crate::rdi::UserDefaults;
use crate::record_types::Sex;

// Constants for tracker configuration
pub const DEFAULT_DATA_DIR: &str = "data";
pub const UNIT_CONVERSIONS_FILE: &str = "unit-conversions.json";
pub const RDI_TABLE_FILE: &str = "rdi.csv";
pub const DEFAULT_OVER_LIMIT_PERCENT: f64 = 120.0;

/// Configuration of a tracker instance
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// PostgreSQL connection string; the in-memory store is used when absent
    pub database_url: Option<String>,
    /// Directory holding the reference tables
    pub data_dir: PathBuf,
    /// Unit conversion table (JSON)
    pub unit_conversions_path: PathBuf,
    /// Static RDI fallback table (CSV)
    pub rdi_table_path: PathBuf,
    /// Defaults for users missing age, sex or timezone
    pub defaults: UserDefaults,
    /// Percent of target above which a nutrient is flagged
    pub over_limit_percent: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::with_data_dir(PathBuf::from(DEFAULT_DATA_DIR))
    }
}

impl TrackerConfig {
    /// Defaults with both reference tables under `data_dir`
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            database_url: None,
            unit_conversions_path: data_dir.join(UNIT_CONVERSIONS_FILE),
            rdi_table_path: data_dir.join(RDI_TABLE_FILE),
            data_dir,
            defaults: UserDefaults::default(),
            over_limit_percent: DEFAULT_OVER_LIMIT_PERCENT,
        }
    }

    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let data_dir = var("NUTRIENT_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let mut config = Self::with_data_dir(data_dir);

        config.database_url = var("DATABASE_URL");
        if let Some(path) = var("NUTRIENT_UNIT_CONVERSIONS") {
            config.unit_conversions_path = PathBuf::from(path);
        }
        if let Some(path) = var("NUTRIENT_RDI_TABLE") {
            config.rdi_table_path = PathBuf::from(path);
        }
        if let Some(timezone) = var("NUTRIENT_DEFAULT_TIMEZONE") {
            config.defaults.timezone = timezone.trim().to_string();
        }
        if let Some(age) = var("NUTRIENT_DEFAULT_AGE") {
            config.defaults.age = age.trim().parse().map_err(|_| {
                NutritionError::Config(format!("NUTRIENT_DEFAULT_AGE is not a valid age: {age}"))
            })?;
        }
        if let Some(sex) = var("NUTRIENT_DEFAULT_SEX") {
            config.defaults.sex = sex
                .parse::<Sex>()
                .map_err(|e| NutritionError::Config(format!("NUTRIENT_DEFAULT_SEX: {e}")))?;
        }
        if let Some(percent) = var("NUTRIENT_OVER_LIMIT_PERCENT") {
            config.over_limit_percent = percent
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value > 0.0)
                .ok_or_else(|| {
                    NutritionError::Config(format!(
                        "NUTRIENT_OVER_LIMIT_PERCENT must be a positive number: {percent}"
                    ))
                })?;
        }

        Ok(config)
    }
}
