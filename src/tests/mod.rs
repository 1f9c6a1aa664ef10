//! # Test Support and Pipeline Scenarios
//!
//! Shared fixtures for the unit tests: a scripted [`RecordSink`] that replays
//! canned HTTP outcomes and counts attempts, plus helpers for building configs
//! and payloads. End-to-end collector scenarios live in `pipeline_tests`.

use crate::config::{Config, DeliveryConfig};
use crate::delivery::{RecordSink, SinkError, SinkResponse};
use crate::{CalibratedReading, DataSource, Payload};
use chrono::{Duration, FixedOffset, TimeZone};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::mpsc;


/// Sink that replays scripted responses, then repeats a default outcome.
pub(crate) struct ScriptedSink {
    script: RefCell<VecDeque<Result<SinkResponse, SinkError>>>,
    otherwise: Result<SinkResponse, SinkError>,
    probe: Result<SinkResponse, SinkError>,
    attempts: Cell<u32>,
    delivered: RefCell<Vec<Payload>>,
}

fn status(code: u16) -> Result<SinkResponse, SinkError> {
    Ok(SinkResponse {
        status: code,
        body: String::new(),
    })
}

impl ScriptedSink {
    /// Every request answers with `code`, the probe included.
    pub(crate) fn always(code: u16) -> Self {
        ScriptedSink {
            script: RefCell::new(VecDeque::new()),
            otherwise: status(code),
            probe: status(code),
            attempts: Cell::new(0),
            delivered: RefCell::new(Vec::new()),
        }
    }

    /// Every request fails at the transport level.
    pub(crate) fn unreachable() -> Self {
        let down = Err(SinkError::Transport("connection refused".into()));
        ScriptedSink {
            otherwise: down.clone(),
            probe: down,
            ..Self::always(201)
        }
    }

    /// Inserts follow `responses`, then answer 201; the probe answers 200.
    pub(crate) fn script(responses: Vec<Result<SinkResponse, SinkError>>) -> Self {
        ScriptedSink {
            script: RefCell::new(responses.into()),
            probe: status(200),
            ..Self::always(201)
        }
    }

    pub(crate) fn with_probe(mut self, code: u16) -> Self {
        self.probe = status(code);
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    pub(crate) fn delivered(&self) -> Vec<Payload> {
        self.delivered.borrow().clone()
    }
}

impl RecordSink for ScriptedSink {
    async fn insert(&self, payload: &Payload) -> Result<SinkResponse, SinkError> {
        self.attempts.set(self.attempts.get() + 1);
        let outcome = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());
        if matches!(&outcome, Ok(r) if (200..300).contains(&r.status)) {
            self.delivered.borrow_mut().push(payload.clone());
        }
        outcome
    }

    async fn probe(&self) -> Result<SinkResponse, SinkError> {
        self.probe.clone()
    }
}

pub(crate) fn transport_error() -> Result<SinkResponse, SinkError> {
    Err(SinkError::Transport("connection reset".into()))
}

pub(crate) fn http(code: u16) -> Result<SinkResponse, SinkError> {
    status(code)
}

/// Delivery settings with no pause between attempts.
pub(crate) fn fast_delivery(max_attempts: u32) -> DeliveryConfig {
    DeliveryConfig {
        max_attempts,
        retry_delay_secs: 0,
    }
}

/// Default config with every sleep set to zero.
pub(crate) fn fast_config() -> Config {
    let mut config = Config::default();
    config.endpoint.url = "https://example.test/rest/v1/sensor_readings".into();
    config.delivery = fast_delivery(3);
    config.collector.cycle_interval_secs = 0;
    config.collector.invalid_backoff_secs = 0;
    config
}

/// Distinct payloads ordered by `seq`.
pub(crate) fn payload_at(seq: u32) -> Payload {
    let tz = FixedOffset::east_opt(0).unwrap();
    let at = tz.with_ymd_and_hms(2025, 3, 18, 0, 0, 0).unwrap() + Duration::seconds(seq as i64);
    let reading = CalibratedReading {
        temperature: 25.0,
        ph: 7.0,
        quality: 50.0,
    };
    Payload::new(&reading, DataSource::ArduinoUno, &at)
}

pub(crate) fn sample_payload() -> Payload {
    payload_at(0)
}

/// Reader that blocks until the paired sender is dropped, then reports end of stream.
pub(crate) struct Silent(pub(crate) mpsc::Receiver<()>);

impl Read for Silent {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}
