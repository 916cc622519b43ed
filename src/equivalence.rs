use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::assumptions::AssumptionSet;

pub const EV_KM: &str = "ev_km";
pub const MEATLESS_MEALS: &str = "meatless_meals";

const DEFAULT_DECIMALS: u32 = 2;

/// Beyond this many decimals an f64 carries no further precision.
pub const MAX_DECIMALS: u32 = 15;

/// A relatable unit and the number of decimals its quantity is rounded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquivalenceUnit {
    pub name: String,
    pub decimals: u32,
}

impl EquivalenceUnit {
    /// `decimals` is clamped to `MAX_DECIMALS`.
    pub fn new(name: impl Into<String>, decimals: u32) -> Self {
        Self {
            name: name.into(),
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    /// Coefficient key holding the grams CO2e of one unit.
    pub fn constant_key(&self) -> String {
        format!("equivalence.{}.gco2_per_unit", self.name)
    }

    /// Half the last kept digit: the worst-case error introduced by rounding.
    pub fn rounding_tolerance(&self) -> f64 {
        0.5 * 10f64.powi(-(self.decimals.min(MAX_DECIMALS) as i32))
    }
}

/// Round half away from zero to `decimals` places, at most `MAX_DECIMALS`.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals.min(MAX_DECIMALS) as i32);
    (value * scale).round() / scale
}

/// Converted quantities plus the units that could not be converted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EquivalenceResult {
    pub quantities: IndexMap<String, f64>,
    pub failed: Vec<String>,
}

impl EquivalenceResult {
    /// Quantity for `unit`, if it converted.
    pub fn get(&self, unit: &str) -> Option<f64> {
        self.quantities.get(unit).copied()
    }

    /// True when no unit failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered list of units a total is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquivalenceConverter {
    units: Vec<EquivalenceUnit>,
}

impl Default for EquivalenceConverter {
    /// EV kilometers to one decimal, meatless meals to two.
    fn default() -> Self {
        Self::new(vec![
            EquivalenceUnit::new(EV_KM, 1),
            EquivalenceUnit::new(MEATLESS_MEALS, 2),
        ])
    }
}

impl EquivalenceConverter {
    /// Convert into exactly `units`, in that order.
    pub fn new(units: Vec<EquivalenceUnit>) -> Self {
        Self { units }
    }

    /// One unit per id under `equivalence`, keeping the default rounding for
    /// the well-known units.
    pub fn from_assumptions(set: &AssumptionSet) -> Self {
        let units = set
            .categories("equivalence")
            .into_iter()
            .map(|name| {
                let decimals = match name {
                    EV_KM => 1,
                    _ => DEFAULT_DECIMALS,
                };
                EquivalenceUnit::new(name, decimals)
            })
            .collect();
        Self { units }
    }

    /// Configured units, in conversion order.
    pub fn units(&self) -> &[EquivalenceUnit] {
        &self.units
    }

    /// Look up a configured unit by name.
    pub fn unit(&self, name: &str) -> Option<&EquivalenceUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Convert every unit independently; a unit whose constant is missing or
    /// zero, or whose quantity is not finite, lands in `failed` and the
    /// others still convert.
    pub fn convert(&self, total_g: f64, set: &AssumptionSet) -> EquivalenceResult {
        let mut result = EquivalenceResult::default();
        for unit in &self.units {
            match set.resolve(&unit.constant_key()) {
                Ok(per_unit) if per_unit > 0.0 => {
                    let q = round_to(total_g / per_unit, unit.decimals);
                    if q.is_finite() {
                        result.quantities.insert(unit.name.clone(), q);
                    } else {
                        warn!(unit = %unit.name, total_g, "non-finite quantity, unit skipped");
                        result.failed.push(unit.name.clone());
                    }
                }
                Ok(_) => {
                    warn!(unit = %unit.name, "zero conversion constant, unit skipped");
                    result.failed.push(unit.name.clone());
                }
                Err(err) => {
                    warn!(unit = %unit.name, error = %err, "equivalence unit skipped");
                    result.failed.push(unit.name.clone());
                }
            }
        }
        result
    }
}
