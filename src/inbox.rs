use log::warn;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Producer half, handed to the MQTT event thread
#[derive(Clone)]
pub struct InboxSender {
    tx: SyncSender<InboundMessage>,
}

/// Consumer half, drained by the runner once per tick
pub struct Inbox {
    rx: Receiver<InboundMessage>,
    capacity: usize,
}

pub fn inbox(capacity: usize) -> (InboxSender, Inbox) {
    let (tx, rx) = sync_channel(capacity);
    (InboxSender { tx }, Inbox { rx, capacity })
}

impl InboxSender {
    /// Never blocks the caller. Returns false when the message was dropped.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let message = InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(m)) => {
                warn!("📩 Inbox full, dropping message on '{}'", m.topic);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl Inbox {
    /// Messages queued so far, at most one queue's worth, so a chatty broker
    /// cannot starve the telemetry cycle.
    pub fn drain(&self) -> impl Iterator<Item = InboundMessage> + '_ {
        self.rx.try_iter().take(self.capacity)
    }
}
