#![forbid(unsafe_code)]

//! CO2e estimate for online video viewing.
//!
//! An [`AssumptionSet`] holds the coefficient table loaded from YAML plus any
//! session overrides. [`compute`] turns a [`SelectionParameters`] into an
//! itemized [`EmissionBreakdown`] in grams CO2e, and an
//! [`EquivalenceConverter`] expresses the total in relatable units.

pub mod assumptions;
pub mod calculator;
pub mod equivalence;
pub mod error;
pub mod mix;
pub mod selection;

pub use assumptions::{AssumptionSet, REQUIRED_SECTIONS};
pub use calculator::{compute, term, Category, EmissionBreakdown, EmissionTerm, Scope};
pub use equivalence::{EquivalenceConverter, EquivalenceResult, EquivalenceUnit};
pub use error::{CalcError, CalcResult, ConfigLoadError, ErrorKind};
pub use mix::{compute_mix, MixSlice, UsageMix};
pub use selection::{Cadence, SelectionParameters, WEEKS_PER_YEAR};
