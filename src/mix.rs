use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::assumptions::AssumptionSet;
use crate::calculator::{compute, EmissionBreakdown, EmissionTerm};
use crate::error::{CalcError, CalcResult};
use crate::selection::{validate_duration, Cadence, SelectionParameters};

/// Portion of viewing time spent on one device/network/resolution combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSlice {
    pub share_percent: f64,
    pub device: String,
    pub network: String,
    pub resolution: String,
}

impl MixSlice {
    /// `share_percent` is relative to the other slices of the same mix.
    pub fn new(
        share_percent: f64,
        device: impl Into<String>,
        network: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            share_percent,
            device: device.into(),
            network: network.into(),
            resolution: resolution.into(),
        }
    }
}

/// Viewing habits as a weighted blend of slices sharing one region and
/// duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMix {
    pub region: String,
    pub duration_minutes: f64,
    #[serde(default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub include_production: bool,
    pub slices: Vec<MixSlice>,
}

impl UsageMix {
    /// Shares scaled to sum to one. Percentages that do not add up to 100
    /// are rescaled rather than rejected.
    pub fn normalized_shares(&self) -> CalcResult<Vec<f64>> {
        if self
            .slices
            .iter()
            .any(|s| !s.share_percent.is_finite() || s.share_percent < 0.0)
        {
            return Err(CalcError::InvalidSelection(
                "mix shares must be finite and non-negative",
            ));
        }
        let total: f64 = self.slices.iter().map(|s| s.share_percent).sum();
        if total <= 0.0 {
            return Err(CalcError::InvalidSelection(
                "mix shares must sum to a positive value",
            ));
        }
        Ok(self.slices.iter().map(|s| s.share_percent / total).collect())
    }

    fn slice_selection(&self, slice: &MixSlice, share: f64) -> SelectionParameters {
        SelectionParameters {
            device: slice.device.clone(),
            resolution: slice.resolution.clone(),
            network: slice.network.clone(),
            region: self.region.clone(),
            duration_minutes: self.duration_minutes * share,
            cadence: self.cadence,
            include_production: self.include_production,
        }
    }
}

/// Compute each slice over its share of the duration and sum terms by id.
pub fn compute_mix(set: &AssumptionSet, mix: &UsageMix) -> CalcResult<EmissionBreakdown> {
    validate_duration(mix.duration_minutes, mix.cadence)?;
    let shares = mix.normalized_shares()?;

    let mut merged: IndexMap<&'static str, EmissionTerm> = IndexMap::new();
    let mut hours = 0.0;
    for (slice, share) in mix.slices.iter().zip(shares) {
        let part = compute(set, &mix.slice_selection(slice, share))?;
        hours += part.hours();
        for t in part.terms() {
            match merged.get_mut(t.id) {
                Some(acc) => {
                    acc.grams += t.grams;
                    for key in &t.inputs {
                        if !acc.inputs.contains(key) {
                            acc.inputs.push(key.clone());
                        }
                    }
                }
                None => {
                    merged.insert(t.id, t.clone());
                }
            }
        }
    }
    Ok(EmissionBreakdown::from_terms(
        merged.into_values().collect(),
        hours,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::term;
    use crate::error::ErrorKind;

    const YAML: &str = r#"
device:
  laptop:
    power_watts: 50
    production_kgco2e: 200
    lifetime_hours: 10000
  smartphone:
    power_watts: 4
    production_kgco2e: 60
    lifetime_hours: 3500
network:
  fixed:
    gco2_per_gb: 1
    gco2_per_hour: 0.5
  mobile:
    gco2_per_gb: 12
    gco2_per_hour: 1
resolution:
  480p:
    gb_per_hour: 0.5
  1080p:
    gb_per_hour: 3
region:
  fr:
    gco2_per_kwh: 52
datacenter:
  gco2_per_gb: 2
  gco2_per_hour: 1
equivalence:
  ev_km:
    gco2_per_unit: 20
"#;

    fn set() -> AssumptionSet {
        AssumptionSet::from_yaml_str(YAML).unwrap()
    }

    fn mix(slices: Vec<MixSlice>) -> UsageMix {
        UsageMix {
            region: "fr".into(),
            duration_minutes: 120.0,
            cadence: Cadence::Once,
            include_production: true,
            slices,
        }
    }

    #[test]
    fn single_slice_matches_plain_compute() {
        let set = set();
        let m = mix(vec![MixSlice::new(100.0, "laptop", "fixed", "1080p")]);
        let blended = compute_mix(&set, &m).unwrap();
        let plain = compute(
            &set,
            &SelectionParameters::new("laptop", "1080p", "fixed", "fr", 120.0).with_production(),
        )
        .unwrap();
        assert!((blended.total_g() - plain.total_g()).abs() < 1e-9);
        assert_eq!(blended.terms().len(), plain.terms().len());
    }

    #[test]
    fn blend_is_share_weighted_and_rescaled() {
        let set = set();
        let a = compute(
            &set,
            &SelectionParameters::new("laptop", "1080p", "fixed", "fr", 120.0).with_production(),
        )
        .unwrap();
        let b = compute(
            &set,
            &SelectionParameters::new("smartphone", "480p", "mobile", "fr", 120.0)
                .with_production(),
        )
        .unwrap();

        // 30/30 rescales to an even split
        let m = mix(vec![
            MixSlice::new(30.0, "laptop", "fixed", "1080p"),
            MixSlice::new(30.0, "smartphone", "mobile", "480p"),
        ]);
        let blended = compute_mix(&set, &m).unwrap();
        assert!((blended.total_g() - (a.total_g() + b.total_g()) / 2.0).abs() < 1e-9);
        assert!((blended.hours() - 2.0).abs() < 1e-12);

        let sum: f64 = blended.terms().iter().map(|t| t.grams).sum();
        assert!((sum - blended.total_g()).abs() < 1e-9);

        let transfer = blended.term(term::NETWORK_TRANSFER).unwrap();
        assert!(transfer.inputs.contains(&"network.fixed.gco2_per_gb".to_string()));
        assert!(transfer.inputs.contains(&"network.mobile.gco2_per_gb".to_string()));
    }

    #[test]
    fn rejects_empty_or_negative_shares() {
        let set = set();
        let err = compute_mix(&set, &mix(vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSelection);

        let err = compute_mix(
            &set,
            &mix(vec![MixSlice::new(-10.0, "laptop", "fixed", "480p")]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSelection);
    }

    #[test]
    fn rejects_weekly_mix_longer_than_a_week() {
        let mut m = mix(vec![MixSlice::new(100.0, "laptop", "fixed", "480p")]);
        m.cadence = Cadence::Weekly;
        m.duration_minutes = 11_000.0;
        let err = compute_mix(&set(), &m).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSelection);
    }

    #[test]
    fn zero_share_slice_is_still_validated() {
        let m = mix(vec![
            MixSlice::new(100.0, "laptop", "fixed", "480p"),
            MixSlice::new(0.0, "console", "fixed", "480p"),
        ]);
        match compute_mix(&set(), &m) {
            Err(CalcError::UnsupportedSelection { field, value }) => {
                assert_eq!(field, "device");
                assert_eq!(value, "console");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
