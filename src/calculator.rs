use serde::Serialize;
use tracing::debug;

use crate::assumptions::AssumptionSet;
use crate::error::CalcResult;
use crate::selection::SelectionParameters;

/// Stable term identifiers emitted in every breakdown.
pub mod term {
    pub const DEVICE_ENERGY: &str = "device_energy";
    pub const DEVICE_PRODUCTION: &str = "device_production";
    pub const NETWORK_TRANSFER: &str = "network_transfer";
    pub const NETWORK_OVERHEAD: &str = "network_overhead";
    pub const DATACENTER_TRANSFER: &str = "datacenter_transfer";
    pub const DATACENTER_RUNTIME: &str = "datacenter_runtime";
}

const WH_PER_KWH: f64 = 1000.0;
const G_PER_KG: f64 = 1000.0;

/// Emission source a term belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Device,
    Network,
    Datacenter,
}

/// Usage terms scale with viewing; production terms are embodied emissions
/// amortized over the device lifetime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Usage,
    Production,
}

/// One named contribution, in grams CO2e.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionTerm {
    pub id: &'static str,
    pub category: Category,
    pub scope: Scope,
    pub grams: f64,
    /// Coefficient keys this term was computed from.
    pub inputs: Vec<String>,
}

/// Ordered terms and their total. Built once per computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionBreakdown {
    terms: Vec<EmissionTerm>,
    total_g: f64,
    hours: f64,
}

impl EmissionBreakdown {
    pub(crate) fn from_terms(terms: Vec<EmissionTerm>, hours: f64) -> Self {
        let total_g = terms.iter().map(|t| t.grams).sum();
        Self {
            terms,
            total_g,
            hours,
        }
    }

    /// Terms in evaluation order.
    pub fn terms(&self) -> &[EmissionTerm] {
        &self.terms
    }

    /// Term by stable id, see [`term`].
    pub fn term(&self, id: &str) -> Option<&EmissionTerm> {
        self.terms.iter().find(|t| t.id == id)
    }

    /// Sum of all terms, grams CO2e.
    pub fn total_g(&self) -> f64 {
        self.total_g
    }

    /// Sum of all terms, kilograms CO2e.
    pub fn total_kg(&self) -> f64 {
        self.total_g / G_PER_KG
    }

    /// Total excluding device manufacturing, i.e. the marginal footprint.
    pub fn usage_total_g(&self) -> f64 {
        self.terms
            .iter()
            .filter(|t| t.scope == Scope::Usage)
            .map(|t| t.grams)
            .sum()
    }

    /// Sum of the terms in `category`, grams CO2e.
    pub fn category_total_g(&self, category: Category) -> f64 {
        self.terms
            .iter()
            .filter(|t| t.category == category)
            .map(|t| t.grams)
            .sum()
    }

    /// Viewing hours the breakdown covers.
    pub fn hours(&self) -> f64 {
        self.hours
    }
}

/// Resolves coefficients for one term and remembers which keys were read.
struct TermInputs<'a> {
    set: &'a AssumptionSet,
    keys: Vec<String>,
}

impl<'a> TermInputs<'a> {
    fn new(set: &'a AssumptionSet) -> Self {
        Self {
            set,
            keys: Vec::new(),
        }
    }

    fn get(&mut self, key: String) -> CalcResult<f64> {
        let value = self.set.resolve(&key)?;
        self.keys.push(key);
        Ok(value)
    }

    fn finish(
        self,
        id: &'static str,
        category: Category,
        scope: Scope,
        grams: f64,
    ) -> EmissionTerm {
        EmissionTerm {
            id,
            category,
            scope,
            grams,
            inputs: self.keys,
        }
    }
}

/// Electricity drawn by the viewing device, priced at the regional grid mix.
pub fn device_energy_term(
    set: &AssumptionSet,
    device: &str,
    region: &str,
    hours: f64,
) -> CalcResult<EmissionTerm> {
    let mut inputs = TermInputs::new(set);
    let watts = inputs.get(format!("device.{device}.power_watts"))?;
    let grid = inputs.get(format!("region.{region}.gco2_per_kwh"))?;
    let kwh = watts * hours / WH_PER_KWH;
    Ok(inputs.finish(term::DEVICE_ENERGY, Category::Device, Scope::Usage, kwh * grid))
}

/// Manufacturing emissions spread over the device lifetime (at least one hour).
pub fn device_production_term(
    set: &AssumptionSet,
    device: &str,
    hours: f64,
) -> CalcResult<EmissionTerm> {
    let mut inputs = TermInputs::new(set);
    let production_kg = inputs.get(format!("device.{device}.production_kgco2e"))?;
    let lifetime_hours = inputs.get(format!("device.{device}.lifetime_hours"))?.max(1.0);
    let grams = production_kg * G_PER_KG / lifetime_hours * hours;
    Ok(inputs.finish(
        term::DEVICE_PRODUCTION,
        Category::Device,
        Scope::Production,
        grams,
    ))
}

/// Data volume implied by the resolution, priced at the network's intensity.
pub fn network_transfer_term(
    set: &AssumptionSet,
    network: &str,
    resolution: &str,
    hours: f64,
) -> CalcResult<EmissionTerm> {
    let mut inputs = TermInputs::new(set);
    let gb = inputs.get(format!("resolution.{resolution}.gb_per_hour"))? * hours;
    let intensity = inputs.get(format!("network.{network}.gco2_per_gb"))?;
    Ok(inputs.finish(
        term::NETWORK_TRANSFER,
        Category::Network,
        Scope::Usage,
        gb * intensity,
    ))
}

/// Per-user access network draw that does not depend on the data volume.
pub fn network_overhead_term(
    set: &AssumptionSet,
    network: &str,
    hours: f64,
) -> CalcResult<EmissionTerm> {
    let mut inputs = TermInputs::new(set);
    let per_hour = inputs.get(format!("network.{network}.gco2_per_hour"))?;
    Ok(inputs.finish(
        term::NETWORK_OVERHEAD,
        Category::Network,
        Scope::Usage,
        per_hour * hours,
    ))
}

/// Serving-side emissions proportional to the data volume.
pub fn datacenter_transfer_term(
    set: &AssumptionSet,
    resolution: &str,
    hours: f64,
) -> CalcResult<EmissionTerm> {
    let mut inputs = TermInputs::new(set);
    let gb = inputs.get(format!("resolution.{resolution}.gb_per_hour"))? * hours;
    let intensity = inputs.get("datacenter.gco2_per_gb".to_string())?;
    Ok(inputs.finish(
        term::DATACENTER_TRANSFER,
        Category::Datacenter,
        Scope::Usage,
        gb * intensity,
    ))
}

/// Serving-side emissions per viewing hour, independent of volume.
pub fn datacenter_runtime_term(set: &AssumptionSet, hours: f64) -> CalcResult<EmissionTerm> {
    let mut inputs = TermInputs::new(set);
    let per_hour = inputs.get("datacenter.gco2_per_hour".to_string())?;
    Ok(inputs.finish(
        term::DATACENTER_RUNTIME,
        Category::Datacenter,
        Scope::Usage,
        per_hour * hours,
    ))
}

/// Evaluate every term for `selection`. Any unknown id or missing
/// coefficient fails the whole call.
pub fn compute(
    set: &AssumptionSet,
    selection: &SelectionParameters,
) -> CalcResult<EmissionBreakdown> {
    selection.validate(set)?;
    let hours = selection.hours();
    let s = selection;

    let mut terms = Vec::with_capacity(6);
    terms.push(device_energy_term(set, &s.device, &s.region, hours)?);
    if s.include_production {
        terms.push(device_production_term(set, &s.device, hours)?);
    }
    terms.push(network_transfer_term(set, &s.network, &s.resolution, hours)?);
    terms.push(network_overhead_term(set, &s.network, hours)?);
    terms.push(datacenter_transfer_term(set, &s.resolution, hours)?);
    terms.push(datacenter_runtime_term(set, hours)?);

    let breakdown = EmissionBreakdown::from_terms(terms, hours);
    debug!(
        device = %s.device,
        resolution = %s.resolution,
        network = %s.network,
        region = %s.region,
        hours,
        total_g = breakdown.total_g(),
        "computed breakdown"
    );
    Ok(breakdown)
}
