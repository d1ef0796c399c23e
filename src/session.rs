//! Broker session state machine.
//!
//! ```text
//! Disconnected --connect+subscribe ok--> Connected
//! Disconnected --attempt fails---------> Disconnected (after SESSION_BACKOFF)
//! Connected    --transport drops-------> Disconnected
//! ```
//!
//! `Connecting` only exists for the duration of one attempt. The command topic is
//! subscribed inside the same attempt, so `Connected` always means subscribed.

use crate::config::SESSION_BACKOFF;
use crate::error::{BridgeError, BridgeResult};
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MQTT client underneath the session
pub trait BrokerTransport {
    fn connect(&mut self, client_id: &str) -> anyhow::Result<()>;
    fn subscribe(&mut self, topic: &str) -> anyhow::Result<()>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}

/// Connection flag shared with a transport's event thread.
///
/// Once a disconnect has been seen the latch stays open: a later `Connected`
/// event (an automatic reconnect inside the client library) is not trusted,
/// because that reconnect never resubscribes the command topic. The session
/// has to notice the drop and rebuild the client, which gets a fresh latch.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLatch {
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

impl ConnectionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(&self) {
        if !self.dropped.load(Ordering::SeqCst) {
            self.connected.store(true, Ordering::SeqCst);
        }
    }

    pub fn on_disconnected(&self) {
        self.dropped.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub connect_attempts: u32,
    pub connects: u32,
    pub publishes: u32,
    pub failed_publishes: u32,
}

pub struct SessionManager<T> {
    transport: T,
    client_id: String,
    command_topic: String,
    state: SessionState,
    status: SessionStatus,
}

impl<T: BrokerTransport> SessionManager<T> {
    pub fn new(transport: T, client_id: &str, command_topic: &str) -> Self {
        Self {
            transport,
            client_id: client_id.to_string(),
            command_topic: command_topic.to_string(),
            state: SessionState::Disconnected,
            status: SessionStatus::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    fn refresh(&mut self) {
        if self.state == SessionState::Connected && !self.transport.is_connected() {
            warn!("🔌 MQTT: session lost");
            self.state = SessionState::Disconnected;
        }
    }

    /// One connect attempt per call; a failed attempt sleeps the back-off before returning.
    pub fn ensure_session<D: DelayMs<u32>>(&mut self, delay: &mut D) -> SessionState {
        self.refresh();
        if self.state == SessionState::Connected {
            return self.state;
        }

        self.state = SessionState::Connecting;
        self.status.connect_attempts += 1;
        info!(
            "🔄 MQTT: connecting as '{}' (attempt {})...",
            self.client_id, self.status.connect_attempts
        );

        match self.connect_and_subscribe() {
            Ok(()) => {
                self.status.connects += 1;
                self.state = SessionState::Connected;
                info!("✅ MQTT: connected, subscribed to '{}'", self.command_topic);
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                warn!(
                    "❌ MQTT: connect failed: {:?} -> retry in {}s",
                    e,
                    SESSION_BACKOFF.as_secs()
                );
                delay.delay_ms(SESSION_BACKOFF.as_millis() as u32);
            }
        }
        self.state
    }

    fn connect_and_subscribe(&mut self) -> anyhow::Result<()> {
        self.transport.connect(&self.client_id)?;
        if let Err(e) = self.transport.subscribe(&self.command_topic) {
            // never leave a connected-but-unsubscribed session behind
            self.transport.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Fire once; the caller drops the message on failure.
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> BridgeResult<()> {
        self.refresh();
        if self.state != SessionState::Connected {
            self.status.failed_publishes += 1;
            return Err(BridgeError::NotConnected);
        }

        match self.transport.publish(topic, payload) {
            Ok(()) => {
                self.status.publishes += 1;
                debug!("📤 MQTT: {} bytes to '{}'", payload.len(), topic);
                Ok(())
            }
            Err(e) => {
                self.status.failed_publishes += 1;
                Err(BridgeError::Transport(format!("{:?}", e)))
            }
        }
    }
}
