//! Bounded FIFO of payloads awaiting redelivery.
//!
//! Memory only: whatever is buffered when the process exits is lost. Under a
//! sustained outage the oldest payloads are evicted first.

use crate::delivery::{DeliveryClient, RecordSink};
use crate::Payload;
use std::collections::VecDeque;
use tracing::{error, info};

/// Result of one replay pass over the buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    /// Permanently rejected and removed
    pub dropped: usize,
    /// Still buffered after the pass
    pub remaining: usize,
}

#[derive(Debug)]
pub struct RetryBuffer {
    entries: VecDeque<Payload>,
    capacity: usize,
}

impl RetryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RetryBuffer {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered payloads, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Payload> {
        self.entries.iter()
    }

    /// Append a payload; returns the evicted oldest entry when over capacity.
    pub fn offer(&mut self, payload: Payload) -> Option<Payload> {
        self.entries.push_back(payload);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Try every buffered payload once, in insertion order.
    ///
    /// Delivered payloads are removed, permanently rejected ones are dropped,
    /// and the rest stay buffered in their original order.
    pub async fn drain_attempt<S: RecordSink>(&mut self, client: &DeliveryClient<S>) -> DrainReport {
        let mut report = DrainReport::default();
        if self.entries.is_empty() {
            return report;
        }

        info!("Attempting to send {} buffered reading(s)", self.entries.len());
        let mut kept = VecDeque::with_capacity(self.entries.len());
        while let Some(payload) = self.entries.pop_front() {
            match client.deliver_once(&payload).await {
                Ok(()) => {
                    report.delivered += 1;
                    info!("Buffered reading from {} sent", payload.created_at);
                }
                Err(e) if e.is_permanent() => {
                    report.dropped += 1;
                    error!("Dropping buffered reading from {}: {}", payload.created_at, e);
                }
                Err(_) => kept.push_back(payload),
            }
        }
        self.entries = kept;
        report.remaining = self.entries.len();
        report
    }
}
