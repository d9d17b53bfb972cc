use anyhow::Result;
use nutrient_tracker::quantity_converter::{ConversionStrategy, QuantityConverter};
use nutrient_tracker::unit_conversions::ConversionTable;
use nutrient_tracker::units::normalize_unit;
use std::path::PathBuf;

const MASS_UNITS: &[&str] = &["g", "kg", "mg", "μg", "oz", "lb", "公克", "公斤", "毫克", "微克"];
const VOLUME_UNITS: &[&str] = &["ml", "l", "cup", "tbsp", "tsp", "毫升", "公升", "杯", "cc"];

fn shipped_table_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/unit-conversions.json")
}

fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-9 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_normalization_is_idempotent() {
    let raw_units = [
        " G ", "Grams", "公克", "克", "公斤", "毫克", "微克", "µg", "MCG", "公升", "毫升",
        "立方公分", "Cups", "TBSP", "份", "Servings", "顆", "pinch",
    ];
    for raw in raw_units {
        let once = normalize_unit(raw);
        assert!(once.is_some(), "{raw:?} should normalize");
        assert_eq!(once.as_deref().and_then(normalize_unit), once, "{raw:?}");
    }
    assert_eq!(normalize_unit(""), None);
    assert_eq!(normalize_unit(" \t"), None);
}

#[test]
fn test_mass_and_volume_round_trips() {
    let table = ConversionTable::empty();
    let converter = QuantityConverter::new(&table);

    for units in [MASS_UNITS, VOLUME_UNITS] {
        for from in units {
            for to in units {
                let there = converter
                    .convert(3.7, Some(from), Some(to), None)
                    .unwrap_or_else(|| panic!("{from} -> {to} should convert"));
                let back = converter
                    .convert(there, Some(to), Some(from), None)
                    .unwrap_or_else(|| panic!("{to} -> {from} should convert"));
                assert_close(back, 3.7);
            }
        }
    }
}

#[test]
fn test_mass_and_volume_do_not_mix() {
    let table = ConversionTable::empty();
    let converter = QuantityConverter::new(&table);
    assert_eq!(converter.convert(1.0, Some("cup"), Some("g"), None), None);
    assert_eq!(converter.convert(1.0, Some("kg"), Some("ml"), None), None);
}

#[tokio::test]
async fn test_ingredient_override_from_shipped_table() -> Result<()> {
    let table = ConversionTable::load(&shipped_table_path()).await;
    assert!(!table.is_empty());
    let converter = QuantityConverter::new(&table);

    assert_eq!(converter.convert(1.0, Some("顆"), Some("g"), Some("Apple")), Some(150.0));
    assert_eq!(converter.convert(2.0, Some("顆"), Some("公克"), Some("蘋果")), Some(300.0));
    // Without ingredient context a piece weighs one gram
    assert_eq!(converter.convert(1.0, Some("顆"), Some("g"), None), Some(1.0));
    Ok(())
}

#[tokio::test]
async fn test_cup_to_milliliters() -> Result<()> {
    let table = ConversionTable::load(&shipped_table_path()).await;
    let converter = QuantityConverter::new(&table);
    assert_eq!(converter.convert(1.0, Some("cup"), Some("ml"), None), Some(240.0));
    assert_eq!(converter.convert(1.0, Some("杯"), Some("毫升"), None), Some(240.0));
    Ok(())
}

#[tokio::test]
async fn test_ingredient_volume_to_mass() -> Result<()> {
    let table = ConversionTable::load(&shipped_table_path()).await;
    let converter = QuantityConverter::new(&table);
    let conversion = converter.convert_detailed(2.0, Some("cup"), Some("g"), Some("Rice"));
    assert_eq!(conversion.map(|c| c.value), Some(370.0));
    assert_eq!(conversion.map(|c| c.strategy), Some(ConversionStrategy::MassTarget));
    Ok(())
}

#[test]
fn test_serving_conversions() {
    let table = ConversionTable::empty();
    let converter = QuantityConverter::new(&table);

    let identity = converter.convert_detailed(2.0, Some("servings"), Some("portion"), None);
    assert_eq!(identity.map(|c| c.strategy), Some(ConversionStrategy::CountIdentity));

    // A serving has no weight or volume of its own
    assert_eq!(converter.convert(1.0, Some("serving"), Some("g"), None), None);
    assert_eq!(converter.convert(250.0, Some("serving"), Some("kg"), None), None);
    assert_eq!(converter.convert(2.0, Some("portion"), Some("ml"), None), None);
    assert_eq!(converter.convert(2.0, Some("份"), Some("cup"), None), None);
}

#[test]
fn test_pieces_are_mass_units() {
    let table = ConversionTable::empty();
    let converter = QuantityConverter::new(&table);

    let grams = converter.convert_detailed(2.0, Some("pieces"), Some("g"), None);
    assert_eq!(grams.map(|c| c.strategy), Some(ConversionStrategy::MassTarget));
    assert_eq!(grams.map(|c| c.value), Some(2.0));
    assert_close(converter.convert(500.0, Some("piece"), Some("kg"), None).unwrap_or_default(), 0.5);

    // Pieces and servings are not interchangeable counts
    assert_eq!(converter.convert(1.0, Some("piece"), Some("serving"), None), None);
    assert_eq!(converter.convert(1.0, Some("serving"), Some("顆"), None), None);
}

#[tokio::test]
async fn test_corrupt_table_degrades_to_fixed_factors() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut file, b"{ not json")?;
    let table = ConversionTable::load(file.path()).await;
    assert!(table.is_empty());

    let converter = QuantityConverter::new(&table);
    assert_eq!(converter.convert(1.0, Some("顆"), Some("g"), Some("Apple")), Some(1.0));
    assert_eq!(converter.convert(2.0, Some("kg"), Some("g"), None), Some(2000.0));
    Ok(())
}
