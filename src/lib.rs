//! ESP32 PZEM-004T energy meter to MQTT bridge
//!
//! The bridge core (link, session, command, telemetry, runner) is platform
//! independent; ESP-IDF drivers live in `platform` and are only built for the
//! device target.

pub mod command;
pub mod config;
pub mod error;
pub mod inbox;
pub mod link;
pub mod pzem;
pub mod runner;
pub mod sensor;
pub mod session;
pub mod simulator;
pub mod telemetry;

#[cfg(target_os = "espidf")]
pub mod platform;

pub use command::{Command, CommandHandler, CommandOutcome};
pub use config::{BridgeConfig, MqttConfig, PzemConfig, TopicConfig, WifiConfig};
pub use error::{BridgeError, BridgeResult, SensorError};
pub use inbox::{inbox, InboundMessage, Inbox, InboxSender};
pub use link::{LinkManager, LinkState, NetworkLink};
pub use pzem::{Pzem004t, PzemPort};
pub use runner::{BridgeStatus, Clock, Runner, TickReport};
pub use sensor::{EnergySensor, Reading, Snapshot};
pub use session::{BrokerTransport, ConnectionLatch, SessionManager, SessionState, SessionStatus};
pub use simulator::{MeterProfile, SimulatedMeter};
pub use telemetry::TelemetryCycle;
