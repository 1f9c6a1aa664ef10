//! # Water Telemetry Core Library
//!
//! This library provides the data structures and pipeline stages for a water-quality
//! telemetry collector. A microcontroller streams `temperature,pH,quality` lines over
//! a serial link; each line is parsed, calibrated, validated and forwarded as a JSON
//! record to a REST data store.
//!
//! ## Design Philosophy
//!
//! ### One Pipeline, Policy Knobs
//! There is exactly one ingestion path. Behavioural differences between deployments
//! (clamp versus strict validation, calibration on or off, simulation fallback on or
//! off) are selected through [`config::Config`], never by duplicating the loop.
//!
//! ### At-Least-Once Delivery
//! - **Bounded retries**: transient HTTP failures are retried a fixed number of times
//! - **Retry buffer**: payloads that still fail are kept in a bounded FIFO and replayed
//!   after the next successful write
//! - **Explicit loss**: buffer eviction and permanently rejected payloads are logged;
//!   nothing disappears silently
//!
//! ### Data Flow
//! 1. **Serial**: raw line → [`parser::parse`] → [`RawReading`]
//! 2. **Validate**: [`calibration::Calibrator`] → [`CalibratedReading`]
//! 3. **Deliver**: [`Payload`] → [`delivery::DeliveryClient`] → remote store, or
//!    [`retry_buffer::RetryBuffer`] on transient failure
//! 4. **Offline**: after repeated bad readings or a lost link, [`fallback`] readings
//!    tagged `simulated` keep the store populated
//!
//! ## Core Types
//! - [`RawReading`]: three parsed numbers, not yet trusted
//! - [`CalibratedReading`]: corrected values within physical bounds
//! - [`Payload`]: the wire record sent to the data store

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

// Module declarations
pub mod calibration;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod delivery;
pub mod fallback;
pub mod line_source;
pub mod parser;
pub mod retry_buffer;

#[cfg(test)]
mod tests;

/// Timestamp layout expected by the `created_at` column.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Three numeric fields parsed from one CSV line.
///
/// Values are exactly as the microcontroller reported them. Nothing about their
/// range is guaranteed yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawReading {
    /// Temperature as reported by the sensor (°C before calibration)
    pub temperature: f64,
    /// pH before offset and temperature compensation
    pub ph: f64,
    /// Turbidity-derived quality score
    pub quality: f64,
}

/// A reading after calibration and validation.
///
/// Invariant: `temperature ∈ [0, 40]`, `ph ∈ [0, 14]`, `quality ∈ [0, 100]`.
///
/// # Example
/// ```
/// use water_telemetry_lib::CalibratedReading;
///
/// let reading = CalibratedReading { temperature: 24.5, ph: 7.1, quality: 42.0 };
/// assert!(reading.ph < 14.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibratedReading {
    /// Water temperature in °C
    pub temperature: f64,
    /// Temperature-compensated pH
    pub ph: f64,
    /// Quality score (higher means murkier water, see [`classifier`])
    pub quality: f64,
}

/// Origin of a reading, recorded with every stored row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Genuine sensor data from the serial-connected board
    ArduinoUno,
    /// Synthetic data produced while the sensor is unavailable
    Simulated,
}

impl DataSource {
    /// Wire name of the source, as stored in the `data_source` column.
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::ArduinoUno => "arduino_uno",
            DataSource::Simulated => "simulated",
        }
    }
}

/// JSON record written to the remote data store.
///
/// Built once per accepted reading and never mutated. It is either delivered
/// and dropped, or moved into the retry buffer.
///
/// # Example
/// ```
/// use chrono::{FixedOffset, TimeZone};
/// use water_telemetry_lib::{CalibratedReading, DataSource, Payload};
///
/// let tz = FixedOffset::east_opt(0).unwrap();
/// let at = tz.with_ymd_and_hms(2025, 3, 18, 9, 30, 0).unwrap();
/// let reading = CalibratedReading { temperature: 25.0, ph: 7.2, quality: 45.0 };
/// let payload = Payload::new(&reading, DataSource::ArduinoUno, &at);
///
/// assert_eq!(payload.created_at, "2025-03-18 09:30:00");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub temperature: f64,
    #[serde(rename = "pH")]
    pub ph: f64,
    pub quality: f64,
    pub data_source: DataSource,
    /// Local wall-clock time formatted with [`CREATED_AT_FORMAT`]
    pub created_at: String,
}

impl Payload {
    /// Build a payload stamped with the given instant.
    pub fn new<Tz>(reading: &CalibratedReading, source: DataSource, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Payload {
            temperature: reading.temperature,
            ph: reading.ph,
            quality: reading.quality,
            data_source: source,
            created_at: at.format(CREATED_AT_FORMAT).to_string(),
        }
    }
}
