use crate::config::PAYLOAD_CAPACITY;
use crate::error::{BridgeError, BridgeResult};
use crate::sensor::{EnergySensor, Snapshot};
use crate::session::{BrokerTransport, SessionManager};
use log::{debug, warn};
use std::time::Duration;

pub type Payload = heapless::Vec<u8, PAYLOAD_CAPACITY>;

/// Serialize into a fixed buffer of `N` bytes; never grows past it
pub fn encode_into<const N: usize>(snapshot: &Snapshot) -> BridgeResult<heapless::Vec<u8, N>> {
    let bytes = serde_json::to_vec(snapshot).map_err(|_| BridgeError::Encode)?;
    heapless::Vec::from_slice(&bytes).map_err(|_| BridgeError::PayloadTooLarge {
        len: bytes.len(),
        capacity: N,
    })
}

pub fn encode_snapshot(snapshot: &Snapshot) -> BridgeResult<Payload> {
    encode_into::<PAYLOAD_CAPACITY>(snapshot)
}

/// Fixed period measured from the end of the previous run, not aligned to wall-clock
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period: Duration,
    last: Option<Duration>,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// The first check is always due
    pub fn is_due(&self, now: Duration) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.period,
        }
    }

    pub fn mark(&mut self, now: Duration) {
        self.last = Some(now);
    }
}

pub struct TelemetryCycle {
    topic: String,
    published: u32,
    dropped: u32,
}

impl TelemetryCycle {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            published: 0,
            dropped: 0,
        }
    }

    pub fn stats(&self) -> (u32, u32) {
        (self.published, self.dropped)
    }

    /// Sample, sanitize, encode, publish. A failed publish is not retried.
    pub fn tick<S, T>(&mut self, sensor: &mut S, session: &mut SessionManager<T>) -> BridgeResult<()>
    where
        S: EnergySensor,
        T: BrokerTransport,
    {
        let reading = sensor.read();
        let snapshot = Snapshot::from(reading);

        let result = encode_snapshot(&snapshot)
            .and_then(|payload| {
                debug!("📊 {}", String::from_utf8_lossy(&payload));
                session.publish(&self.topic, &payload)
            });

        match &result {
            Ok(()) => self.published += 1,
            Err(e) => {
                self.dropped += 1;
                warn!("❌ Telemetry skipped: {}", e);
            }
        }
        result
    }
}
