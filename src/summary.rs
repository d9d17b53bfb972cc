//! # Nutrient Summary Module
//!
//! Compares aggregated intake with RDI targets for display.
//!
//! A percentage is only produced when both the intake and a non-zero target
//! are known, so an unknown intake never reads as "0% of target".

use serde::Serialize;
use std::collections::BTreeMap;

use crate::datetime::DayRange;
use crate::nutrient_model::{format_value, NutrientKey, NutrientTotals, NutrientValue};
use crate::rdi::{RdiRecord, RdiTable, UserContext};
use crate::record_types::Sex;

/// Fraction digits of displayed amounts
pub const VALUE_DIGITS: i32 = 2;
/// Fraction digits of displayed percentages
pub const PERCENT_DIGITS: i32 = 1;

/// Which target an intake is compared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
}

/// One nutrient's line in a summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
    pub unit: String,
    pub value: NutrientValue,
    pub display: String,
    pub percent: Option<f64>,
    pub percent_display: String,
    pub is_over_limit: bool,
    pub source: Option<String>,
    pub region: Option<String>,
}

/// Percent of `target` reached by `value`
pub fn percent_of_target(value: NutrientValue, target: Option<f64>) -> Option<f64> {
    match (value, target) {
        (Some(value), Some(target)) if target != 0.0 => Some(value / target * 100.0),
        _ => None,
    }
}

/// Summary entry for every nutrient, keyed by field name
pub fn build_nutrient_summary(
    totals: &NutrientTotals,
    rdi: &RdiTable,
    timeframe: Timeframe,
    over_limit_percent: f64,
) -> BTreeMap<&'static str, SummaryEntry> {
    NutrientKey::ALL
        .into_iter()
        .map(|key| {
            let value = totals.get(key);
            let record = rdi.get(key);
            let target = match timeframe {
                Timeframe::Daily => record.daily,
                Timeframe::Weekly => record.weekly,
            };
            let percent = percent_of_target(value, target);
            let entry = SummaryEntry {
                unit: key.unit().to_string(),
                value,
                display: format_value(value, VALUE_DIGITS),
                percent,
                percent_display: format_value(percent, PERCENT_DIGITS),
                is_over_limit: percent.is_some_and(|p| p > over_limit_percent),
                source: record.source.clone(),
                region: record.region.clone(),
            };
            (key.field_name(), entry)
        })
        .collect()
}

/// Daily and weekly targets keyed by field name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetValues {
    pub daily: BTreeMap<&'static str, Option<f64>>,
    pub weekly: BTreeMap<&'static str, Option<f64>>,
}

/// Everything shown on an intake dashboard for one range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub timeframe: Timeframe,
    pub range: DayRange,
    pub timezone: String,
    pub user_id: Option<i64>,
    pub sex: Sex,
    pub age: u32,
    pub totals: BTreeMap<&'static str, SummaryEntry>,
    pub intake: NutrientTotals,
    pub percent: BTreeMap<&'static str, Option<f64>>,
    pub rdi: TargetValues,
}

impl DashboardReport {
    /// Assemble a report from aggregated intake and resolved targets
    pub fn build(
        timeframe: Timeframe,
        range: DayRange,
        context: &UserContext,
        intake: NutrientTotals,
        rdi: &RdiTable,
        over_limit_percent: f64,
    ) -> Self {
        let totals = build_nutrient_summary(&intake, rdi, timeframe, over_limit_percent);
        let percent = totals
            .iter()
            .map(|(name, entry)| (*name, entry.percent))
            .collect();
        let targets = |pick: fn(&RdiRecord) -> Option<f64>| -> BTreeMap<&'static str, Option<f64>> {
            rdi.iter()
                .map(|record| (record.nutrient.field_name(), pick(record)))
                .collect()
        };

        Self {
            timeframe,
            range,
            timezone: context.timezone.clone(),
            user_id: context.user_id,
            sex: context.sex,
            age: context.age,
            totals,
            intake,
            percent,
            rdi: TargetValues {
                daily: targets(|record| record.daily),
                weekly: targets(|record| record.weekly),
            },
        }
    }

    /// Nutrients above the over-limit threshold
    pub fn over_limit(&self) -> Vec<&'static str> {
        self.totals
            .iter()
            .filter(|(_, entry)| entry.is_over_limit)
            .map(|(name, _)| *name)
            .collect()
    }
}
