//! # Collector
//!
//! The main loop that wires source, parser, calibrator, delivery and buffer
//! together. It is a small state machine:
//!
//! ```text
//! Connecting ──probe ok──▶ Running ──streak / lost link──▶ SensorFailure ──▶ Simulating
//!     │                                                          │
//!     └──probe failed──▶ Terminated ◀──────fallback disabled─────┘
//! ```
//!
//! ## Cycle
//! 1. Read lines until one parses or is reported malformed (silent skips are free)
//! 2. Calibrate and validate under the configured policy
//! 3. Deliver; transient failure buffers the payload, permanent failure drops it
//! 4. After a successful delivery, replay the retry buffer
//! 5. Sleep the cycle interval, or the short backoff after a bad reading
//!
//! Simulation never hands control back to the sensor. Leaving it requires a
//! restart.
//!
//! ## Shutdown
//! [`Shutdown`] is checked between cycles and while waiting for serial input, and
//! it cuts an inter-cycle sleep short. The line source is closed on every exit
//! path when the collector is dropped.

use crate::calibration::Calibrator;
use crate::classifier::Assessment;
use crate::config::Config;
use crate::delivery::{DeliveryClient, RecordSink};
use crate::fallback::FallbackGenerator;
use crate::line_source::LineSource;
use crate::parser::{parse, ParseOutcome};
use crate::retry_buffer::RetryBuffer;
use crate::{CalibratedReading, DataSource, Payload, RawReading};
use chrono::{DateTime, FixedOffset, Utc};
use rand::rngs::ThreadRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("connectivity probe failed, not entering the main loop")]
    ProbeFailed,

    #[error("sensor unavailable and fallback disabled: {0}")]
    SensorUnavailable(String),

    #[error("invalid collector settings: {0}")]
    Config(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Connecting,
    Running,
    SensorFailure,
    Simulating,
    Terminated,
}

/// Counters reported when the collector stops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub accepted: u64,
    pub rejected: u64,
    pub simulated: u64,
    pub delivered: u64,
    pub buffered: u64,
    pub evicted: u64,
    pub dropped: u64,
}

/// Cooperative stop signal shared with the Ctrl-C handler.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown arrives first.
    ///
    /// Returns false when the sleep was cut short (or shutdown was already set).
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_triggered(),
            _ = self.notify.notified() => false,
        }
    }
}

enum LineRead {
    Reading(RawReading),
    Malformed,
    Lost(String),
    Interrupted,
}

pub struct Collector<S, L, R = ThreadRng> {
    config: Config,
    calibrator: Calibrator,
    client: DeliveryClient<S>,
    buffer: RetryBuffer,
    source: Option<L>,
    generator: FallbackGenerator<R>,
    offset: FixedOffset,
    shutdown: Shutdown,
    state: State,
    error_streak: u32,
    stats: SessionStats,
}

impl<S: RecordSink, L: LineSource> Collector<S, L, ThreadRng> {
    /// Build a collector. `source` is `None` when the sensor could not be opened.
    pub fn new(
        config: Config,
        sink: S,
        source: Option<L>,
        shutdown: Shutdown,
    ) -> Result<Self, CollectorError> {
        let minutes = config.collector.utc_offset_minutes;
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                CollectorError::Config(format!("utc_offset_minutes {} out of range", minutes))
            })?;

        Ok(Collector {
            calibrator: Calibrator::new(config.calibration.clone(), config.validation.policy),
            client: DeliveryClient::new(sink, &config.delivery),
            buffer: RetryBuffer::new(config.buffer.capacity),
            source,
            generator: FallbackGenerator::new(),
            offset,
            shutdown,
            state: State::Connecting,
            error_streak: 0,
            stats: SessionStats::default(),
            config,
        })
    }
}

impl<S: RecordSink, L: LineSource, R: Rng> Collector<S, L, R> {
    /// Swap the simulation RNG.
    pub fn with_generator<R2: Rng>(self, generator: FallbackGenerator<R2>) -> Collector<S, L, R2> {
        Collector {
            config: self.config,
            calibrator: self.calibrator,
            client: self.client,
            buffer: self.buffer,
            source: self.source,
            generator,
            offset: self.offset,
            shutdown: self.shutdown,
            state: self.state,
            error_streak: self.error_streak,
            stats: self.stats,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn error_streak(&self) -> u32 {
        self.error_streak
    }

    pub fn buffer(&self) -> &RetryBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn client(&self) -> &DeliveryClient<S> {
        &self.client
    }

    /// Run until shutdown, or until the sensor fails with fallback disabled.
    pub async fn run(mut self) -> Result<SessionStats, CollectorError> {
        self.connect().await?;

        let result = loop {
            if self.shutdown.is_triggered() {
                info!("Shutdown requested, stopping collector");
                break Ok(());
            }
            let pause = match self.step().await {
                Ok(pause) => pause,
                Err(e) => break Err(e),
            };
            if self.state == State::Terminated {
                break Ok(());
            }
            debug!("Next cycle in {:?}", pause);
            if !self.shutdown.sleep(pause).await {
                info!("Shutdown requested, stopping collector");
                break Ok(());
            }
        };

        self.close();
        self.transition(State::Terminated);
        info!(
            "Session: {} accepted, {} rejected, {} simulated, {} delivered, {} buffered ({} still pending), {} evicted, {} dropped",
            self.stats.accepted,
            self.stats.rejected,
            self.stats.simulated,
            self.stats.delivered,
            self.stats.buffered,
            self.buffer.len(),
            self.stats.evicted,
            self.stats.dropped
        );
        result.map(|_| self.stats)
    }

    /// Probe the data store and pick the starting mode.
    pub async fn connect(&mut self) -> Result<(), CollectorError> {
        self.transition(State::Connecting);
        if !self.client.test_connectivity().await {
            error!("Cannot reach the data store, check endpoint.url and endpoint.api_key");
            self.close();
            self.transition(State::Terminated);
            return Err(CollectorError::ProbeFailed);
        }
        info!(
            "Data store reachable, {:?} validation in effect",
            self.calibrator.policy()
        );

        match self.source.as_ref().map(|s| s.name().to_string()) {
            Some(name) => {
                info!("Waiting for data from {}", name);
                self.transition(State::Running);
                Ok(())
            }
            None => self
                .sensor_failure("sensor could not be opened".to_string())
                .map(|_| ()),
        }
    }

    /// Execute one cycle and return how long to wait before the next.
    pub async fn step(&mut self) -> Result<Duration, CollectorError> {
        match self.state {
            State::Running => self.sensor_cycle().await,
            State::Simulating => Ok(self.simulated_cycle().await),
            State::Connecting | State::SensorFailure | State::Terminated => Ok(Duration::ZERO),
        }
    }

    async fn sensor_cycle(&mut self) -> Result<Duration, CollectorError> {
        let raw = match self.read_reading() {
            LineRead::Reading(raw) => raw,
            LineRead::Malformed => return self.record_invalid(),
            LineRead::Lost(reason) => return self.sensor_failure(reason),
            LineRead::Interrupted => return Ok(Duration::ZERO),
        };

        match self.calibrator.process(&raw) {
            Ok(validated) => {
                for warning in &validated.warnings {
                    warn!("{}", warning);
                }
                self.error_streak = 0;
                self.stats.accepted += 1;
                self.report(&validated.reading, DataSource::ArduinoUno);

                let payload = Payload::new(&validated.reading, DataSource::ArduinoUno, &self.now());
                self.dispatch(payload).await;
                Ok(self.config.collector.cycle_interval())
            }
            Err(e) => {
                warn!(
                    "Invalid reading rejected: {} (temp={}, pH={}, quality={})",
                    e, raw.temperature, raw.ph, raw.quality
                );
                self.record_invalid()
            }
        }
    }

    async fn simulated_cycle(&mut self) -> Duration {
        let reading = self.generator.generate();
        self.stats.simulated += 1;
        self.report(&reading, DataSource::Simulated);

        let payload = Payload::new(&reading, DataSource::Simulated, &self.now());
        self.dispatch(payload).await;
        self.config.collector.cycle_interval()
    }

    /// Pull lines until one yields a reading or an error worth counting.
    fn read_reading(&mut self) -> LineRead {
        let Some(source) = self.source.as_mut() else {
            return LineRead::Lost("no line source".to_string());
        };
        loop {
            if self.shutdown.is_triggered() {
                return LineRead::Interrupted;
            }
            let line = match source.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return LineRead::Lost(format!("{} reached end of stream", source.name())),
                Err(e) => return LineRead::Lost(e.to_string()),
            };
            match parse(&line) {
                ParseOutcome::Reading(raw) => return LineRead::Reading(raw),
                ParseOutcome::Skipped(reason) => {
                    if !line.is_empty() {
                        debug!("Skipping line {:?}: {:?}", line, reason);
                    }
                }
                ParseOutcome::Malformed { token } => {
                    warn!("Parse error: {:?} is not a number in line {:?}", token, line);
                    return LineRead::Malformed;
                }
            }
        }
    }

    fn record_invalid(&mut self) -> Result<Duration, CollectorError> {
        self.error_streak += 1;
        self.stats.rejected += 1;
        let threshold = self.config.collector.error_streak_threshold;
        if threshold > 0 && self.error_streak >= threshold {
            let reason = format!("{} consecutive invalid readings", self.error_streak);
            self.sensor_failure(reason)?;
        } else {
            info!(
                "Invalid reading streak {}/{}, retrying in {:?}",
                self.error_streak,
                threshold,
                self.config.collector.invalid_backoff()
            );
        }
        Ok(self.config.collector.invalid_backoff())
    }

    fn sensor_failure(&mut self, reason: String) -> Result<Duration, CollectorError> {
        self.transition(State::SensorFailure);
        error!("Sensor failure: {}", reason);
        self.close();

        if self.config.collector.fallback_enabled {
            warn!("Switching to simulated readings; restart the collector to resume sensor input");
            self.transition(State::Simulating);
            Ok(Duration::ZERO)
        } else {
            self.transition(State::Terminated);
            Err(CollectorError::SensorUnavailable(reason))
        }
    }

    async fn dispatch(&mut self, payload: Payload) {
        match self.client.deliver(&payload).await {
            Ok(()) => {
                self.stats.delivered += 1;
                info!("✓ Reading delivered ({})", payload.data_source.as_str());

                let report = self.buffer.drain_attempt(&self.client).await;
                self.stats.delivered += report.delivered as u64;
                self.stats.dropped += report.dropped as u64;
                if report.remaining > 0 {
                    warn!("{} buffered reading(s) still pending", report.remaining);
                }
            }
            Err(e) if e.is_permanent() => {
                self.stats.dropped += 1;
                error!("× Reading dropped, server rejected it: {}", e);
            }
            Err(e) => {
                warn!("× Delivery failed: {}; buffering reading", e);
                self.stats.buffered += 1;
                if let Some(evicted) = self.buffer.offer(payload) {
                    self.stats.evicted += 1;
                    warn!(
                        "Retry buffer full, discarded oldest reading from {}",
                        evicted.created_at
                    );
                }
                info!("{}/{} reading(s) buffered", self.buffer.len(), self.buffer.capacity());
            }
        }
    }

    fn report(&self, reading: &CalibratedReading, source: DataSource) {
        let assessment = Assessment::of(reading);
        info!(
            "{} reading: temp={:.2}°C pH={:.2} quality={:.1} | {} | quality {} | {}",
            source.as_str(),
            reading.temperature,
            reading.ph,
            reading.quality,
            assessment.water_use,
            assessment.quality,
            assessment.turbidity
        );
        debug!(
            "Advice: {}; {}",
            assessment.ph_advice, assessment.turbidity_advice
        );
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    fn transition(&mut self, next: State) {
        if self.state != next {
            info!("Collector state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn close(&mut self) {
        if let Some(source) = self.source.take() {
            info!("Closed line source {}", source.name());
        }
    }
}
