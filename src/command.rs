use crate::sensor::EnergySensor;
use crate::session::{BrokerTransport, SessionManager};
use log::{debug, info, warn};
use serde_json::{Map, Value};

pub const RESET_ACK: &[u8] = br#"{"status":"energy reset"}"#;

/// The only inbound document the bridge acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub reset: bool,
}

impl Command {
    /// `Some` only for a JSON object whose `reset` member is boolean `true`
    pub fn decode(payload: &[u8]) -> Option<Command> {
        let doc: Map<String, Value> = serde_json::from_slice(payload).ok()?;
        let command = Command {
            reset: doc.get("reset")?.as_bool()?,
        };
        command.reset.then_some(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Ignored,
    ResetAcknowledged,
    ResetUnacknowledged,
}

pub struct CommandHandler {
    ack_topic: String,
    resets: u32,
}

impl CommandHandler {
    pub fn new(ack_topic: &str) -> Self {
        Self {
            ack_topic: ack_topic.to_string(),
            resets: 0,
        }
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn handle<S, T>(
        &mut self,
        payload: &[u8],
        sensor: &mut S,
        session: &mut SessionManager<T>,
    ) -> CommandOutcome
    where
        S: EnergySensor,
        T: BrokerTransport,
    {
        if Command::decode(payload).is_none() {
            debug!("📩 Command ignored: {}", String::from_utf8_lossy(payload));
            return CommandOutcome::Ignored;
        }

        info!(">>> RESET ENERGY <<<");
        self.resets += 1;
        // the meter is reset whether or not the broker can hear about it
        if let Err(e) = sensor.reset_energy() {
            warn!("❌ Energy reset failed: {}", e);
        }

        match session.publish(&self.ack_topic, RESET_ACK) {
            Ok(()) => CommandOutcome::ResetAcknowledged,
            Err(e) => {
                warn!("❌ Reset acknowledgment dropped: {}", e);
                CommandOutcome::ResetUnacknowledged
            }
        }
    }
}
