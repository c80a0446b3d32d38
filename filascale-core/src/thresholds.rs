//! Per-material threshold sets and the status evaluator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::status::StatusRecord;

/// Acceptable range for one monitored quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    /// Preferred value, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimal: Option<f64>,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            optimal: None,
        }
    }
}

/// Limits for one material type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(alias = "Humidity")]
    pub humidity: Range,
    #[serde(alias = "DryingTemp")]
    pub drying_temperature: Range,
    #[serde(alias = "Weight")]
    pub weight: Range,
}

impl ThresholdSet {
    pub const fn new(humidity: Range, drying_temperature: Range, weight: Range) -> Self {
        Self {
            humidity,
            drying_temperature,
            weight,
        }
    }
}

/// Quantity a violation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Humidity,
    DryingTemperature,
    Weight,
}

impl Quantity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::Humidity => "humidity",
            Quantity::DryingTemperature => "drying temperature",
            Quantity::Weight => "weight",
        }
    }
}

/// Which side of the range was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Above,
    Below,
}

/// One out-of-range condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdViolation {
    pub quantity: Quantity,
    pub value: f64,
    pub limit: f64,
    pub bound: Bound,
}

impl fmt::Display for ThresholdViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.bound {
            Bound::Above => "above max",
            Bound::Below => "below min",
        };
        write!(
            f,
            "{} {} {} {}",
            self.quantity.as_str(),
            self.value,
            side,
            self.limit
        )
    }
}

/// Compare a status record against a threshold set.
///
/// Humidity and drying temperature are checked against their maximum,
/// weight against its minimum.
pub fn evaluate_thresholds(status: &StatusRecord, set: &ThresholdSet) -> Vec<ThresholdViolation> {
    let mut violations = Vec::new();

    if status.humidity > set.humidity.max {
        violations.push(ThresholdViolation {
            quantity: Quantity::Humidity,
            value: status.humidity,
            limit: set.humidity.max,
            bound: Bound::Above,
        });
    }

    if status.temperature > set.drying_temperature.max {
        violations.push(ThresholdViolation {
            quantity: Quantity::DryingTemperature,
            value: status.temperature,
            limit: set.drying_temperature.max,
            bound: Bound::Above,
        });
    }

    if status.weight < set.weight.min {
        violations.push(ThresholdViolation {
            quantity: Quantity::Weight,
            value: status.weight,
            limit: set.weight.min,
            bound: Bound::Below,
        });
    }

    violations
}

/// Threshold sets keyed by material name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    materials: BTreeMap<String, ThresholdSet>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ThresholdTable {
    /// Table with the stock materials
    pub fn with_defaults() -> Self {
        let weight = Range::new(200.0, 5000.0);
        let mut materials = BTreeMap::new();

        materials.insert(
            "Nylon".to_string(),
            ThresholdSet::new(Range::new(10.0, 20.0), Range::new(80.0, 90.0), weight),
        );
        materials.insert(
            "PETG".to_string(),
            ThresholdSet::new(Range::new(10.0, 25.0), Range::new(70.0, 90.0), weight),
        );
        materials.insert(
            "ABS".to_string(),
            ThresholdSet::new(Range::new(10.0, 30.0), Range::new(70.0, 90.0), weight),
        );
        materials.insert(
            "ASA".to_string(),
            ThresholdSet::new(Range::new(10.0, 30.0), Range::new(70.0, 90.0), weight),
        );
        materials.insert(
            "PLA".to_string(),
            ThresholdSet::new(Range::new(10.0, 30.0), Range::new(50.0, 65.0), weight),
        );

        Self { materials }
    }

    pub fn get(&self, material: &str) -> Option<&ThresholdSet> {
        self.materials.get(material)
    }

    pub fn contains(&self, material: &str) -> bool {
        self.materials.contains_key(material)
    }

    pub fn materials(&self) -> impl Iterator<Item = &String> {
        self.materials.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(humidity: f64, temperature: f64, weight: f64) -> StatusRecord {
        StatusRecord {
            printer_name: "bender_prime".to_string(),
            spool_id: 1423659708,
            temperature,
            humidity,
            weight,
        }
    }

    #[test]
    fn test_nylon_humidity_flagged() {
        let table = ThresholdTable::with_defaults();
        let nylon = table.get("Nylon").unwrap();

        let violations = evaluate_thresholds(&status(25.0, 85.0, 500.0), nylon);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].quantity, Quantity::Humidity);
        assert_eq!(violations[0].bound, Bound::Above);
        assert_eq!(violations[0].value, 25.0);
        assert_eq!(violations[0].limit, 20.0);
    }

    #[test]
    fn test_all_in_range() {
        let table = ThresholdTable::with_defaults();
        let pla = table.get("PLA").unwrap();

        assert!(evaluate_thresholds(&status(15.0, 55.0, 800.0), pla).is_empty());
    }

    #[test]
    fn test_all_out_of_range() {
        let table = ThresholdTable::with_defaults();
        let pla = table.get("PLA").unwrap();

        let violations = evaluate_thresholds(&status(45.0, 70.0, 150.0), pla);
        let quantities: Vec<Quantity> = violations.iter().map(|v| v.quantity).collect();

        assert_eq!(
            quantities,
            vec![
                Quantity::Humidity,
                Quantity::DryingTemperature,
                Quantity::Weight
            ]
        );
        assert_eq!(violations[2].bound, Bound::Below);
    }

    #[test]
    fn test_limits_are_inclusive() {
        let set = ThresholdSet::new(
            Range::new(10.0, 20.0),
            Range::new(80.0, 90.0),
            Range::new(200.0, 5000.0),
        );
        assert!(evaluate_thresholds(&status(20.0, 90.0, 200.0), &set).is_empty());
    }

    #[test]
    fn test_default_materials() {
        let table = ThresholdTable::with_defaults();
        let names: Vec<&String> = table.materials().collect();
        assert_eq!(names, vec!["ABS", "ASA", "Nylon", "PETG", "PLA"]);
    }

    #[test]
    fn test_violation_display() {
        let v = ThresholdViolation {
            quantity: Quantity::Weight,
            value: 150.0,
            limit: 200.0,
            bound: Bound::Below,
        };
        assert_eq!(v.to_string(), "weight 150 below min 200");
    }

    #[test]
    fn test_table_toml_roundtrip_with_legacy_keys() {
        let toml_str = r#"
            [Nylon.Humidity]
            min = 10
            max = 20
            optimal = 15

            [Nylon.DryingTemp]
            min = 80.0
            max = 90.0

            [Nylon.Weight]
            min = 200.0
            max = 5000.0
        "#;

        let table: ThresholdTable = toml::from_str(toml_str).unwrap();
        let nylon = table.get("Nylon").unwrap();
        assert_eq!(nylon.humidity.max, 20.0);
        assert_eq!(nylon.humidity.optimal, Some(15.0));
        assert_eq!(nylon.drying_temperature.min, 80.0);
        assert_eq!(table.materials().collect::<Vec<_>>(), vec!["Nylon"]);
    }
}
