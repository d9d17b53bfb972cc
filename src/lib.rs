//! # Nutrient Tracker
//!
//! Tracks nutritional intake against recommended daily intake (RDI) targets.
//!
//! Logged recipes, raw ingredients and custom entries are converted across
//! mass, volume, serving and ingredient-specific units into one nutrient
//! vector, where a missing figure stays unknown instead of counting as zero.
//! Recipe totals are cached in the record store, and targets come from a
//! dynamic standards table with a static CSV fallback.

pub mod config;
pub mod contribution;
pub mod datetime;
pub mod db;
pub mod errors;
pub mod intake;
pub mod nutrient_model;
pub mod quantity_converter;
pub mod rdi;
pub mod recipe_totals;
pub mod record_types;
pub mod reference_data;
pub mod store;
pub mod summary;
pub mod tracker;
pub mod unit_conversions;
pub mod units;
