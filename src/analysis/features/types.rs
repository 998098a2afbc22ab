// Types module - per-pulse feature set and its persisted record form

use crate::cache::record::{parse_record, write_record};
use crate::cache::Calculation;
use crate::error::CalculationError;
use crate::store::CalculationTable;
use serde::Serialize;

/// Timing, charge and shape features of one pulse
///
/// Times are in seconds, voltages in volts, charge in coulombs. After
/// alignment the time origin is the 50% leading-edge crossing, so jitter10/20
/// come out negative and jitter80/90 positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSet {
    /// Leading 10% crossing, relative to the first sample
    pub t_start: f64,
    /// Trailing 10% crossing, relative to the first sample
    pub t_end: f64,
    pub charge: f64,
    pub amplitude: f64,
    pub fwhm: f64,
    pub rise1090: f64,
    pub rise2080: f64,
    pub fall1090: f64,
    pub fall2080: f64,
    /// Absolute time of the leading p% crossing
    pub jitter10: f64,
    pub jitter20: f64,
    pub jitter80: f64,
    pub jitter90: f64,
    /// Some crossing search found no crossing and used the closest point
    pub fallback_used: bool,
}

/// Named feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FeatureKind {
    TStart,
    TEnd,
    Charge,
    Amplitude,
    Fwhm,
    Rise1090,
    Rise2080,
    Fall1090,
    Fall2080,
    Jitter10,
    Jitter20,
    Jitter80,
    Jitter90,
}

impl FeatureKind {
    /// Persisted order
    pub const ALL: [FeatureKind; 13] = [
        FeatureKind::TStart,
        FeatureKind::TEnd,
        FeatureKind::Charge,
        FeatureKind::Amplitude,
        FeatureKind::Fwhm,
        FeatureKind::Rise1090,
        FeatureKind::Rise2080,
        FeatureKind::Fall1090,
        FeatureKind::Fall2080,
        FeatureKind::Jitter10,
        FeatureKind::Jitter20,
        FeatureKind::Jitter80,
        FeatureKind::Jitter90,
    ];

    /// Key in the calculation record
    pub fn key(self) -> &'static str {
        match self {
            FeatureKind::TStart => "t1",
            FeatureKind::TEnd => "t2",
            FeatureKind::Charge => "charge",
            FeatureKind::Amplitude => "amplitude",
            FeatureKind::Fwhm => "fwhm",
            FeatureKind::Rise1090 => "rise1090",
            FeatureKind::Rise2080 => "rise2080",
            FeatureKind::Fall1090 => "fall1090",
            FeatureKind::Fall2080 => "fall2080",
            FeatureKind::Jitter10 => "time10",
            FeatureKind::Jitter20 => "time20",
            FeatureKind::Jitter80 => "time80",
            FeatureKind::Jitter90 => "time90",
        }
    }

    pub fn value(self, features: &FeatureSet) -> f64 {
        match self {
            FeatureKind::TStart => features.t_start,
            FeatureKind::TEnd => features.t_end,
            FeatureKind::Charge => features.charge,
            FeatureKind::Amplitude => features.amplitude,
            FeatureKind::Fwhm => features.fwhm,
            FeatureKind::Rise1090 => features.rise1090,
            FeatureKind::Rise2080 => features.rise2080,
            FeatureKind::Fall1090 => features.fall1090,
            FeatureKind::Fall2080 => features.fall2080,
            FeatureKind::Jitter10 => features.jitter10,
            FeatureKind::Jitter20 => features.jitter20,
            FeatureKind::Jitter80 => features.jitter80,
            FeatureKind::Jitter90 => features.jitter90,
        }
    }
}

const FALLBACK_KEY: &str = "fallback";

impl Calculation for FeatureSet {
    const TABLE: CalculationTable = CalculationTable::Features;

    fn to_record(&self) -> String {
        let mut entries: Vec<(&str, f64)> = FeatureKind::ALL
            .iter()
            .map(|kind| (kind.key(), kind.value(self)))
            .collect();
        if self.fallback_used {
            entries.push((FALLBACK_KEY, 1.0));
        }
        write_record(&entries)
    }

    fn from_record(text: &str) -> Result<Self, CalculationError> {
        let fields = parse_record(text)?;
        let get = |kind: FeatureKind| fields.get(kind.key());
        Ok(FeatureSet {
            t_start: get(FeatureKind::TStart)?,
            t_end: get(FeatureKind::TEnd)?,
            charge: get(FeatureKind::Charge)?,
            amplitude: get(FeatureKind::Amplitude)?,
            fwhm: get(FeatureKind::Fwhm)?,
            rise1090: get(FeatureKind::Rise1090)?,
            rise2080: get(FeatureKind::Rise2080)?,
            fall1090: get(FeatureKind::Fall1090)?,
            fall2080: get(FeatureKind::Fall2080)?,
            jitter10: get(FeatureKind::Jitter10)?,
            jitter20: get(FeatureKind::Jitter20)?,
            jitter80: get(FeatureKind::Jitter80)?,
            jitter90: get(FeatureKind::Jitter90)?,
            fallback_used: fields.optional(FALLBACK_KEY).map_or(false, |v| v != 0.0),
        })
    }

    fn validate(&self) -> Result<(), CalculationError> {
        super::validation::check_plausible(self)
    }
}
