//! # Error Types Module
//!
//! This module defines the error taxonomy of the nutrition core.
//!
//! Unit resolution failures and missing reference data are absent
//! from this enum: they travel as unknown nutrient values through the totals
//! algebra. Only conditions that must abort a call are errors here.

use std::path::PathBuf;

/// Errors surfaced by the nutrition core
#[derive(Debug, thiserror::Error)]
pub enum NutritionError {
    /// A recipe totals computation was requested for a recipe that does not exist
    #[error("Recipe {0} not found")]
    RecipeNotFound(i64),
    /// The record store failed to serve a request
    #[error(transparent)]
    Store(#[from] anyhow::Error),
    /// A recipe totals payload could not be serialized for persistence
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
    /// A reference table could not be read or parsed
    #[error("Failed to load reference table {path}: {message}")]
    ReferenceLoad { path: PathBuf, message: String },
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, NutritionError>;
