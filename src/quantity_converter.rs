//! # Quantity Converter
//!
//! Converts a quantity between two units, consulting the qualified
//! [`ConversionTable`] before the fixed mass and volume tables.
//!
//! Conversion runs an ordered list of [`ConversionStrategy`] values. Each
//! strategy either converts, declares the request unresolvable, or passes to
//! the next one:
//!
//! 1. `SameUnit` - identical normalized units
//! 2. `CountIdentity` - both units are dimensionless counts
//! 3. `MassTarget` - target is a mass unit, via grams
//! 4. `VolumeTarget` - target is a volume unit, via milliliters
//! 5. `QualifiedTable` - direct table entry between two arbitrary units
//!
//! A mass or volume target is settled by its own step: when neither the table
//! nor the fixed factors know the source unit, the result is `None`. A serving
//! of an ingredient measured per 100 g is therefore unknown, not 1 g.
//!
//! Failure is always `None`; nothing here returns an error.

use tracing::trace;

use crate::unit_conversions::{ConversionLookup, ConversionTable};
use crate::units::{
    grams_per_unit, grams_to_unit, is_dimensionless_unit, is_mass_unit, is_volume_unit,
    milliliters_per_unit, milliliters_to_unit, normalize_unit, GRAMS, MILLILITERS,
};

/// One step of the conversion chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStrategy {
    SameUnit,
    CountIdentity,
    MassTarget,
    VolumeTarget,
    QualifiedTable,
}

impl ConversionStrategy {
    /// Strategies in the order they are tried
    pub const ORDER: [ConversionStrategy; 5] = [
        ConversionStrategy::SameUnit,
        ConversionStrategy::CountIdentity,
        ConversionStrategy::MassTarget,
        ConversionStrategy::VolumeTarget,
        ConversionStrategy::QualifiedTable,
    ];
}

/// A successful conversion and the strategy that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub value: f64,
    pub strategy: ConversionStrategy,
}

enum Outcome {
    Converted(f64),
    Unresolved,
    Skipped,
}

struct Request<'a> {
    value: f64,
    from: &'a str,
    to: &'a str,
    ingredient: Option<&'a str>,
}

/// Unit converter bound to a conversion table
#[derive(Debug, Clone, Copy)]
pub struct QuantityConverter<'a> {
    table: &'a ConversionTable,
}

impl<'a> QuantityConverter<'a> {
    pub fn new(table: &'a ConversionTable) -> Self {
        Self { table }
    }

    /// Convert `value` from `from_unit` to `to_unit`
    ///
    /// A missing target defaults to grams and a missing source unit to the
    /// target. Returns `None` when no strategy can resolve the pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nutrient_tracker::quantity_converter::QuantityConverter;
    /// use nutrient_tracker::unit_conversions::ConversionTable;
    ///
    /// let table = ConversionTable::empty();
    /// let converter = QuantityConverter::new(&table);
    /// assert_eq!(converter.convert(1.0, Some("cup"), Some("ml"), None), Some(240.0));
    /// assert_eq!(converter.convert(1.0, Some("handful"), Some("g"), None), None);
    /// ```
    pub fn convert(
        &self,
        value: f64,
        from_unit: Option<&str>,
        to_unit: Option<&str>,
        ingredient: Option<&str>,
    ) -> Option<f64> {
        self.convert_detailed(value, from_unit, to_unit, ingredient)
            .map(|conversion| conversion.value)
    }

    /// Convert and report which strategy resolved the request
    pub fn convert_detailed(
        &self,
        value: f64,
        from_unit: Option<&str>,
        to_unit: Option<&str>,
        ingredient: Option<&str>,
    ) -> Option<Conversion> {
        let to = normalize_unit(to_unit.unwrap_or(GRAMS))?;
        let from = match from_unit {
            Some(unit) => normalize_unit(unit)?,
            None => to.clone(),
        };
        let request = Request {
            value,
            from: &from,
            to: &to,
            ingredient,
        };

        for strategy in ConversionStrategy::ORDER {
            match self.apply(strategy, &request) {
                Outcome::Converted(converted) => {
                    trace!(
                        "Converted {value} {from} -> {converted} {to} via {strategy:?} (ingredient: {ingredient:?})"
                    );
                    return Some(Conversion {
                        value: converted,
                        strategy,
                    });
                }
                Outcome::Unresolved => {
                    trace!("Cannot convert {from} -> {to} (ingredient: {ingredient:?})");
                    return None;
                }
                Outcome::Skipped => {}
            }
        }
        None
    }

    /// Convert to grams, the canonical mass unit
    pub fn to_grams(&self, value: f64, unit: Option<&str>, ingredient: Option<&str>) -> Option<f64> {
        self.convert(value, unit, Some(GRAMS), ingredient)
    }

    fn apply(&self, strategy: ConversionStrategy, request: &Request<'_>) -> Outcome {
        match strategy {
            ConversionStrategy::SameUnit => {
                if request.from == request.to {
                    Outcome::Converted(request.value)
                } else {
                    Outcome::Skipped
                }
            }
            ConversionStrategy::CountIdentity => {
                if is_dimensionless_unit(request.from) && is_dimensionless_unit(request.to) {
                    Outcome::Converted(request.value)
                } else {
                    Outcome::Skipped
                }
            }
            ConversionStrategy::MassTarget => {
                if !is_mass_unit(request.to) {
                    return Outcome::Skipped;
                }
                match self.canonical_amount(request, GRAMS, grams_per_unit) {
                    Some(grams) => {
                        Outcome::Converted(grams_to_unit(grams, request.to).unwrap_or(grams))
                    }
                    None => Outcome::Unresolved,
                }
            }
            ConversionStrategy::VolumeTarget => {
                if !is_volume_unit(request.to) {
                    return Outcome::Skipped;
                }
                match self.canonical_amount(request, MILLILITERS, milliliters_per_unit) {
                    Some(ml) => Outcome::Converted(milliliters_to_unit(ml, request.to).unwrap_or(ml)),
                    None => Outcome::Unresolved,
                }
            }
            ConversionStrategy::QualifiedTable => {
                let lookup = ConversionLookup::new(request.from)
                    .to(request.to)
                    .for_ingredient(request.ingredient);
                match self.table.convert(request.value, &lookup) {
                    Some(converted) => Outcome::Converted(converted),
                    None => Outcome::Skipped,
                }
            }
        }
    }

    /// Express the source amount in a canonical unit: qualified table first,
    /// fixed factor second
    fn canonical_amount(
        &self,
        request: &Request<'_>,
        canonical: &str,
        fixed_factor: fn(&str) -> Option<f64>,
    ) -> Option<f64> {
        let lookup = ConversionLookup::new(request.from)
            .to(canonical)
            .for_ingredient(request.ingredient);
        self.table
            .convert(request.value, &lookup)
            .or_else(|| fixed_factor(request.from).map(|factor| request.value * factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> anyhow::Result<ConversionTable> {
        Ok(ConversionTable::from_json_str(
            r#"{
                "apple_顆_g": 150,
                "egg_serving": { "to": "g", "factor": 50 },
                "bowl_cup": 1.5,
                "bar_square": 8
            }"#,
        )?)
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("conversion should resolve");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_same_unit_identity() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        let conversion = converter.convert_detailed(3.0, Some("handful"), Some("Handful"), None);
        assert_eq!(
            conversion,
            Some(Conversion {
                value: 3.0,
                strategy: ConversionStrategy::SameUnit
            })
        );
        Ok(())
    }

    #[test]
    fn test_count_identity() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        let conversion = converter.convert_detailed(2.0, Some("servings"), Some("份"), None);
        assert_eq!(conversion.map(|c| c.strategy), Some(ConversionStrategy::CountIdentity));
        assert_eq!(conversion.map(|c| c.value), Some(2.0));
        Ok(())
    }

    #[test]
    fn test_ingredient_qualified_mass() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        assert_eq!(converter.convert(1.0, Some("顆"), Some("g"), Some("Apple")), Some(150.0));
        assert_eq!(converter.convert(1.0, Some("顆"), Some("g"), Some("Pear")), Some(1.0));
        assert_close(converter.convert(2.0, Some("顆"), Some("kg"), Some("apple")), 0.3);
        Ok(())
    }

    #[test]
    fn test_fixed_mass_and_volume_tables() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        assert_eq!(converter.convert(1.0, Some("cup"), Some("ml"), None), Some(240.0));
        assert_close(converter.convert(1.0, Some("lb"), Some("oz"), None), 16.0);
        assert_close(converter.convert(3.0, Some("tsp"), Some("tbsp"), None), 1.0);
        assert_close(converter.convert(500.0, Some("毫升"), Some("公升"), None), 0.5);
        Ok(())
    }

    #[test]
    fn test_mass_target_failure_is_terminal() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        assert_eq!(converter.convert(1.0, Some("cup"), Some("g"), None), None);
        assert_eq!(converter.convert(1.0, Some("handful"), Some("ml"), None), None);
        Ok(())
    }

    #[test]
    fn test_qualified_table_between_arbitrary_units() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        let conversion = converter.convert_detailed(2.0, Some("bar"), Some("square"), None);
        assert_eq!(
            conversion,
            Some(Conversion {
                value: 16.0,
                strategy: ConversionStrategy::QualifiedTable
            })
        );
        // Volume targets resolve through milliliters only
        assert_eq!(converter.convert(2.0, Some("bowl"), Some("cup"), None), None);
        Ok(())
    }

    #[test]
    fn test_unmapped_count_is_unknown() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        assert_eq!(converter.convert(1.0, Some("serving"), Some("g"), None), None);
        assert_eq!(converter.convert(250.0, Some("serving"), Some("kg"), None), None);
        assert_eq!(converter.convert(2.0, Some("portion"), Some("ml"), None), None);
        assert_eq!(converter.convert(1.0, Some("serving"), Some("g"), Some("Pear")), None);

        // An ingredient-qualified serving weight resolves
        let conversion = converter.convert_detailed(2.0, Some("serving"), Some("g"), Some("egg"));
        assert_eq!(conversion.map(|c| c.strategy), Some(ConversionStrategy::MassTarget));
        assert_eq!(conversion.map(|c| c.value), Some(100.0));
        Ok(())
    }

    #[test]
    fn test_unnormalizable_units() -> anyhow::Result<()> {
        let table = table()?;
        let converter = QuantityConverter::new(&table);
        assert_eq!(converter.convert(1.0, Some("  "), Some("g"), None), None);
        assert_eq!(converter.convert(1.0, Some("g"), Some(""), None), None);
        assert_eq!(converter.convert(5.0, None, None, None), Some(5.0));
        Ok(())
    }
}
