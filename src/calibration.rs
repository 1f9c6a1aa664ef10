//! Calibration and range validation.
//!
//! Raw values are corrected with a linear temperature transform and a pH offset
//! plus temperature compensation:
//!
//! ```text
//! temperature = raw_temp * temp_factor + temp_offset
//! ph          = raw_ph + ph_offset + (temperature - reference_temp) * ph_temp_coefficient
//! ```
//!
//! The corrected values are then held to their physical bounds according to the
//! configured [`ValidationPolicy`]: clamped with a warning, or rejected outright.

use crate::config::{CalibrationConfig, ValidationPolicy};
use crate::{CalibratedReading, RawReading};
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=40.0;
pub const PH_RANGE: RangeInclusive<f64> = 0.0..=14.0;
pub const QUALITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Reading field, used to name the offending value in reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Temperature,
    Ph,
    Quality,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Temperature => "temperature",
            Field::Ph => "pH",
            Field::Quality => "quality",
        })
    }
}

/// Reading rejected under the strict policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: Field,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} is not a finite number")]
    NotFinite { field: Field },
}

/// A value that was pulled back into bounds under the clamp policy.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeWarning {
    pub field: Field,
    /// Value before clamping
    pub value: f64,
    /// Value stored in the reading
    pub clamped: f64,
}

impl fmt::Display for RangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} out of range, clamped to {:.2}",
            self.field, self.value, self.clamped
        )
    }
}

/// A reading that passed validation, with any clamping that happened on the way.
#[derive(Clone, Debug, PartialEq)]
pub struct Validated {
    pub reading: CalibratedReading,
    pub warnings: Vec<RangeWarning>,
}

/// Applies calibration constants and the validation policy.
#[derive(Clone, Debug)]
pub struct Calibrator {
    config: CalibrationConfig,
    policy: ValidationPolicy,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig, policy: ValidationPolicy) -> Self {
        Calibrator { config, policy }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// Run the configured policy over a raw reading.
    pub fn process(&self, raw: &RawReading) -> Result<Validated, ValidationError> {
        check_finite(raw)?;
        match self.policy {
            ValidationPolicy::Clamp => Ok(self.calibrate(raw)),
            ValidationPolicy::Strict => self.validate_sensor_data(raw).map(|reading| Validated {
                reading,
                warnings: Vec::new(),
            }),
        }
    }

    /// Clamp-and-continue: calibrate, then pull every field into bounds.
    ///
    /// pH compensation uses the clamped temperature.
    pub fn calibrate(&self, raw: &RawReading) -> Validated {
        let mut warnings = Vec::new();

        let temperature = clamp_field(
            Field::Temperature,
            self.temperature(raw.temperature),
            TEMPERATURE_RANGE,
            &mut warnings,
        );
        let ph = clamp_field(
            Field::Ph,
            self.ph(raw.ph, temperature),
            PH_RANGE,
            &mut warnings,
        );
        let quality = clamp_field(Field::Quality, raw.quality, QUALITY_RANGE, &mut warnings);

        Validated {
            reading: CalibratedReading {
                temperature,
                ph,
                quality,
            },
            warnings,
        }
    }

    /// Reject-and-count: calibrate, then refuse any field outside its bounds.
    ///
    /// Fields are checked in order temperature, pH, quality; the first failure
    /// is reported.
    pub fn validate_sensor_data(&self, raw: &RawReading) -> Result<CalibratedReading, ValidationError> {
        let temperature = self.temperature(raw.temperature);
        check_range(Field::Temperature, temperature, TEMPERATURE_RANGE)?;

        let ph = self.ph(raw.ph, temperature);
        check_range(Field::Ph, ph, PH_RANGE)?;

        check_range(Field::Quality, raw.quality, QUALITY_RANGE)?;

        Ok(CalibratedReading {
            temperature,
            ph,
            quality: raw.quality,
        })
    }

    fn temperature(&self, raw: f64) -> f64 {
        if !self.config.enabled {
            return raw;
        }
        raw * self.config.temp_factor + self.config.temp_offset
    }

    fn ph(&self, raw: f64, temperature: f64) -> f64 {
        if !self.config.enabled {
            return raw;
        }
        raw + self.config.ph_offset
            + (temperature - self.config.reference_temp) * self.config.ph_temp_coefficient
    }
}

fn check_finite(raw: &RawReading) -> Result<(), ValidationError> {
    for (field, value) in [
        (Field::Temperature, raw.temperature),
        (Field::Ph, raw.ph),
        (Field::Quality, raw.quality),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite { field });
        }
    }
    Ok(())
}

fn check_range(field: Field, value: f64, range: RangeInclusive<f64>) -> Result<(), ValidationError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn clamp_field(
    field: Field,
    value: f64,
    range: RangeInclusive<f64>,
    warnings: &mut Vec<RangeWarning>,
) -> f64 {
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        warnings.push(RangeWarning {
            field,
            value,
            clamped,
        });
    }
    clamped
}
