use serde::{Deserialize, Serialize};

use crate::assumptions::AssumptionSet;
use crate::error::{CalcError, CalcResult};

pub const WEEKS_PER_YEAR: f64 = 52.0;

/// Longest single session accepted: one year of minutes.
pub const MAX_SESSION_MINUTES: f64 = 365.0 * 24.0 * 60.0;
/// Longest weekly habit accepted: every minute of the week.
pub const MAX_WEEKLY_MINUTES: f64 = 7.0 * 24.0 * 60.0;

/// Whether the duration is one viewing session or a weekly habit that is
/// reported per year.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    Once,
    Weekly,
}

impl Cadence {
    /// Number of repetitions folded into one result.
    pub fn periods(self) -> f64 {
        match self {
            Cadence::Once => 1.0,
            Cadence::Weekly => WEEKS_PER_YEAR,
        }
    }

    /// Upper bound on the duration a selection with this cadence may carry.
    pub fn max_minutes(self) -> f64 {
        match self {
            Cadence::Once => MAX_SESSION_MINUTES,
            Cadence::Weekly => MAX_WEEKLY_MINUTES,
        }
    }
}

/// The caller's categorical choices. Ids are validated against the
/// categories present in the loaded assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionParameters {
    pub device: String,
    pub resolution: String,
    pub network: String,
    pub region: String,
    pub duration_minutes: f64,
    #[serde(default)]
    pub cadence: Cadence,
    /// Amortize device manufacturing over its lifetime and add it as a term.
    #[serde(default)]
    pub include_production: bool,
}

impl SelectionParameters {
    /// A single session without production emissions.
    pub fn new(
        device: impl Into<String>,
        resolution: impl Into<String>,
        network: impl Into<String>,
        region: impl Into<String>,
        duration_minutes: f64,
    ) -> Self {
        Self {
            device: device.into(),
            resolution: resolution.into(),
            network: network.into(),
            region: region.into(),
            duration_minutes,
            cadence: Cadence::Once,
            include_production: false,
        }
    }

    /// Treat the duration as a weekly habit reported per year.
    pub fn weekly(mut self) -> Self {
        self.cadence = Cadence::Weekly;
        self
    }

    /// Add amortized device manufacturing to the breakdown.
    pub fn with_production(mut self) -> Self {
        self.include_production = true;
        self
    }

    /// Hours of viewing covered by the result, after annualization.
    pub fn hours(&self) -> f64 {
        self.duration_minutes / 60.0 * self.cadence.periods()
    }

    /// Reject unknown ids and unusable durations before any arithmetic.
    pub fn validate(&self, set: &AssumptionSet) -> CalcResult<()> {
        validate_duration(self.duration_minutes, self.cadence)?;
        for (field, section, value) in [
            ("device", "device", &self.device),
            ("resolution", "resolution", &self.resolution),
            ("network", "network", &self.network),
            ("region", "region", &self.region),
        ] {
            if !set.has_category(section, value) {
                return Err(CalcError::UnsupportedSelection {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_duration(minutes: f64, cadence: Cadence) -> CalcResult<()> {
    if !minutes.is_finite() {
        return Err(CalcError::InvalidSelection("duration must be finite"));
    }
    if minutes < 0.0 {
        return Err(CalcError::InvalidSelection("duration must be non-negative"));
    }
    if minutes > cadence.max_minutes() {
        return Err(CalcError::InvalidSelection(match cadence {
            Cadence::Once => "session duration must not exceed one year",
            Cadence::Weekly => "weekly duration must not exceed one week",
        }));
    }
    Ok(())
}
