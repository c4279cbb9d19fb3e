//! Consumption and production intervals
//!
//! Interval boundaries are kept as the ISO 8601 strings returned by Tibber.
//! They share one offset per home, so lexicographic order is time order.

use super::null_as_default;
use serde::{Deserialize, Serialize};

/// Energy consumed in one interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consumption {
    pub from: String,
    pub to: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit_price: f64,
    #[serde(rename = "unitPriceVAT", alias = "unitPriceVat", default, deserialize_with = "null_as_default")]
    pub unit_price_vat: f64,
    /// kWh
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumption: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumption_unit: String,
}

/// Energy produced in one interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    pub from: String,
    pub to: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profit: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit_price: f64,
    #[serde(rename = "unitPriceVAT", alias = "unitPriceVat", default, deserialize_with = "null_as_default")]
    pub unit_price_vat: f64,
    /// kWh
    #[serde(default, deserialize_with = "null_as_default")]
    pub production: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub production_unit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: String,
}

/// Summed energy and money over a set of intervals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnergyTotals {
    pub energy: f64,
    pub amount: f64,
}

impl Consumption {
    pub fn sort_newest_first(items: &mut [Consumption]) {
        items.sort_by(|a, b| b.from.cmp(&a.from));
    }

    pub fn sort_oldest_first(items: &mut [Consumption]) {
        items.sort_by(|a, b| a.from.cmp(&b.from));
    }

    /// Total consumption (kWh) and cost
    pub fn totals(items: &[Consumption]) -> EnergyTotals {
        items.iter().fold(EnergyTotals::default(), |acc, c| EnergyTotals {
            energy: acc.energy + c.consumption,
            amount: acc.amount + c.cost,
        })
    }
}

impl Production {
    pub fn sort_newest_first(items: &mut [Production]) {
        items.sort_by(|a, b| b.from.cmp(&a.from));
    }

    pub fn sort_oldest_first(items: &mut [Production]) {
        items.sort_by(|a, b| a.from.cmp(&b.from));
    }

    /// Total production (kWh) and profit
    pub fn totals(items: &[Production]) -> EnergyTotals {
        items.iter().fold(EnergyTotals::default(), |acc, p| EnergyTotals {
            energy: acc.energy + p.production,
            amount: acc.amount + p.profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumption(from: &str, kwh: f64, cost: f64) -> Consumption {
        Consumption {
            from: from.to_string(),
            to: from.to_string(),
            consumption: kwh,
            cost,
            currency: "EUR".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sorting_by_interval_start() {
        let mut items = vec![
            consumption("2024-03-02T00:00:00.000+01:00", 1.0, 0.1),
            consumption("2024-03-04T00:00:00.000+01:00", 2.0, 0.2),
            consumption("2024-03-03T00:00:00.000+01:00", 3.0, 0.3),
        ];

        Consumption::sort_newest_first(&mut items);
        assert_eq!(items[0].from, "2024-03-04T00:00:00.000+01:00");
        assert_eq!(items[2].from, "2024-03-02T00:00:00.000+01:00");

        Consumption::sort_oldest_first(&mut items);
        assert_eq!(items[0].from, "2024-03-02T00:00:00.000+01:00");
    }

    #[test]
    fn test_totals() {
        let items = vec![
            consumption("a", 1.5, 0.5),
            consumption("b", 2.5, 1.0),
        ];
        let totals = Consumption::totals(&items);
        assert!((totals.energy - 4.0).abs() < f64::EPSILON);
        assert!((totals.amount - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tibber_node_with_null_cost() {
        let json = r#"{
            "from": "2024-03-02T00:00:00.000+01:00",
            "to": "2024-03-03T00:00:00.000+01:00",
            "cost": null,
            "unitPrice": 0.25,
            "unitPriceVAT": 0.05,
            "consumption": 7.2,
            "consumptionUnit": "kWh",
            "currency": "EUR"
        }"#;
        let c: Consumption = serde_json::from_str(json).unwrap();
        assert_eq!(c.cost, 0.0);
        assert_eq!(c.unit_price_vat, 0.05);
        assert_eq!(c.consumption, 7.2);
    }

    #[test]
    fn test_production_totals() {
        let items = vec![Production {
            from: "a".into(),
            to: "b".into(),
            production: 4.0,
            profit: 0.8,
            ..Default::default()
        }];
        let totals = Production::totals(&items);
        assert_eq!(totals.energy, 4.0);
        assert_eq!(totals.amount, 0.8);
    }
}
