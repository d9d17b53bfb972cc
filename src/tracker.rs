//! # Nutrition Tracker
//!
//! Ties the record store, the reference tables and the engines together behind
//! one handle, and builds daily and weekly dashboards.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nutrient_tracker::config::TrackerConfig;
//! use nutrient_tracker::store::MemoryStore;
//! use nutrient_tracker::summary::Timeframe;
//! use nutrient_tracker::tracker::{DashboardRequest, NutritionTracker};
//!
//! # async fn run() -> nutrient_tracker::errors::Result<()> {
//! let tracker = NutritionTracker::new(Arc::new(MemoryStore::new()), TrackerConfig::default());
//! let report = tracker.dashboard(&DashboardRequest::new(Timeframe::Daily)).await?;
//! println!("{:?}", report.over_limit());
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::warn;

use crate::config::TrackerConfig;
use crate::datetime::{DayRangeResolver, ZonedDayRanges};
use crate::errors::Result;
use crate::intake::IntakeAggregator;
use crate::quantity_converter::{Conversion, QuantityConverter};
use crate::rdi::{resolve_user_context, RdiResolver, UserContext};
use crate::recipe_totals::RecipeTotalsEngine;
use crate::record_types::Sex;
use crate::reference_data::ReferenceData;
use crate::store::RecordStore;
use crate::summary::{DashboardReport, Timeframe};

/// Parameters of a dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRequest {
    pub timeframe: Timeframe,
    /// The day, or the last day of the week; today when absent
    pub date: Option<NaiveDate>,
    pub user_id: Option<i64>,
    /// Overrides the user's sex for target selection
    pub sex: Option<Sex>,
    /// Overrides the user's age for target selection
    pub age: Option<u32>,
}

impl DashboardRequest {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            date: None,
            user_id: None,
            sex: None,
            age: None,
        }
    }
}

/// Entry point to the nutrition core over one record store
pub struct NutritionTracker<S: ?Sized> {
    config: TrackerConfig,
    reference: Arc<ReferenceData>,
    store: Arc<S>,
    recipes: RecipeTotalsEngine<S>,
    intake: IntakeAggregator<S>,
    rdi: RdiResolver<S>,
}

impl<S: RecordStore + ?Sized> NutritionTracker<S> {
    /// Tracker reading its reference tables from the configured paths
    pub fn new(store: Arc<S>, config: TrackerConfig) -> Self {
        let reference = Arc::new(ReferenceData::from_config(&config));
        Self::with_reference(store, reference, config)
    }

    /// Tracker sharing already owned reference data
    pub fn with_reference(store: Arc<S>, reference: Arc<ReferenceData>, config: TrackerConfig) -> Self {
        Self {
            recipes: RecipeTotalsEngine::new(Arc::clone(&store), Arc::clone(&reference)),
            intake: IntakeAggregator::new(Arc::clone(&store), Arc::clone(&reference)),
            rdi: RdiResolver::new(Arc::clone(&store), Arc::clone(&reference)),
            config,
            reference,
            store,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn recipes(&self) -> &RecipeTotalsEngine<S> {
        &self.recipes
    }

    pub fn intake(&self) -> &IntakeAggregator<S> {
        &self.intake
    }

    pub fn rdi(&self) -> &RdiResolver<S> {
        &self.rdi
    }

    /// The user's context with configured defaults for missing attributes
    pub async fn user_context(&self, user_id: Option<i64>) -> UserContext {
        resolve_user_context(self.store.as_ref(), user_id, &self.config.defaults).await
    }

    /// Convert a quantity with the loaded conversion table
    pub async fn convert(
        &self,
        value: f64,
        from_unit: Option<&str>,
        to_unit: Option<&str>,
        ingredient: Option<&str>,
    ) -> Option<Conversion> {
        let table = self.reference.conversion_table().await;
        QuantityConverter::new(&table).convert_detailed(value, from_unit, to_unit, ingredient)
    }

    /// Intake, targets and summary for a day or a seven-day window
    pub async fn dashboard(&self, request: &DashboardRequest) -> Result<DashboardReport> {
        let mut context = self.user_context(request.user_id).await;
        if let Some(sex) = request.sex {
            context.sex = sex;
        }
        if let Some(age) = request.age.filter(|age| *age > 0) {
            context.age = age;
        }

        let ranges = match ZonedDayRanges::from_name(&context.timezone) {
            Ok(ranges) => ranges,
            Err(e) => {
                warn!("{e}, using {}", self.config.defaults.timezone);
                context.timezone = self.config.defaults.timezone.clone();
                ZonedDayRanges::from_name(&context.timezone)?
            }
        };
        let range = match request.timeframe {
            Timeframe::Daily => ranges.day_range(request.date)?,
            Timeframe::Weekly => ranges.seven_day_range(request.date)?,
        };

        let intake = self
            .intake
            .aggregate(context.user_id, range.start, range.end)
            .await?;
        let rdi = self.rdi.resolve(Some(context.age), context.sex).await;

        Ok(DashboardReport::build(
            request.timeframe,
            range,
            &context,
            intake,
            &rdi,
            self.config.over_limit_percent,
        ))
    }
}
