use crate::command::{CommandHandler, CommandOutcome};
use crate::config::{BridgeConfig, IDLE_POLL_INTERVAL, STATUS_INTERVAL, TELEMETRY_CADENCE};
use crate::error::BridgeResult;
use crate::inbox::Inbox;
use crate::link::{LinkManager, LinkState, NetworkLink};
use crate::sensor::EnergySensor;
use crate::session::{BrokerTransport, SessionManager, SessionState, SessionStatus};
use crate::telemetry::{Cadence, TelemetryCycle};
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info};
use std::time::Duration;

/// Monotonic time since boot
pub trait Clock {
    fn now(&self) -> Duration;
}

/// What one pass of the main loop did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub link: LinkState,
    pub session: SessionState,
    pub commands: Vec<CommandOutcome>,
    pub telemetry: Option<BridgeResult<()>>,
}

/// Counters since boot, logged every `STATUS_INTERVAL`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStatus {
    pub link: LinkState,
    pub link_attempts: u32,
    pub session: SessionState,
    pub broker: SessionStatus,
    pub published: u32,
    pub dropped: u32,
    pub resets: u32,
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "link {:?} ({} attempts) | mqtt {} ({}/{} connects, {} publishes, {} failed) | telemetry {} sent, {} dropped | resets {}",
            self.link,
            self.link_attempts,
            self.session,
            self.broker.connects,
            self.broker.connect_attempts,
            self.broker.publishes,
            self.broker.failed_publishes,
            self.published,
            self.dropped,
            self.resets
        )
    }
}

pub struct Runner<L, T, S, D, C> {
    link: LinkManager<L>,
    session: SessionManager<T>,
    sensor: S,
    commands: CommandHandler,
    telemetry: TelemetryCycle,
    cadence: Cadence,
    status_cadence: Cadence,
    inbox: Inbox,
    delay: D,
    clock: C,
}

impl<L, T, S, D, C> Runner<L, T, S, D, C>
where
    L: NetworkLink,
    T: BrokerTransport,
    S: EnergySensor,
    D: DelayMs<u32>,
    C: Clock,
{
    pub fn new(
        config: &BridgeConfig,
        link: L,
        transport: T,
        sensor: S,
        inbox: Inbox,
        delay: D,
        clock: C,
    ) -> Self {
        Self {
            link: LinkManager::new(link),
            session: SessionManager::new(
                transport,
                &config.mqtt.client_id,
                &config.topics.command,
            ),
            sensor,
            commands: CommandHandler::new(&config.topics.telemetry),
            telemetry: TelemetryCycle::new(&config.topics.telemetry),
            cadence: Cadence::new(TELEMETRY_CADENCE),
            status_cadence: Cadence::new(STATUS_INTERVAL),
            inbox,
            delay,
            clock,
        }
    }

    pub fn status(&self) -> BridgeStatus {
        let (published, dropped) = self.telemetry.stats();
        BridgeStatus {
            link: self.link.state(),
            link_attempts: self.link.attempts(),
            session: self.session.state(),
            broker: self.session.status(),
            published,
            dropped,
            resets: self.commands.resets(),
        }
    }

    /// link -> session -> inbound commands -> telemetry, strictly in that order
    pub fn tick(&mut self) -> TickReport {
        let link = self.link.ensure_link(&mut self.delay);
        let session = self.session.ensure_session(&mut self.delay);

        let mut commands = Vec::new();
        for message in self.inbox.drain() {
            if message.topic != self.session.command_topic() {
                debug!("📩 Ignoring message on '{}'", message.topic);
                continue;
            }
            let outcome = self
                .commands
                .handle(&message.payload, &mut self.sensor, &mut self.session);
            commands.push(outcome);
        }

        let telemetry = if self.session.is_connected() && self.cadence.is_due(self.clock.now()) {
            let result = self.telemetry.tick(&mut self.sensor, &mut self.session);
            self.cadence.mark(self.clock.now());
            Some(result)
        } else {
            None
        };

        let now = self.clock.now();
        if self.status_cadence.is_due(now) {
            info!("📈 Status: {}", self.status());
            self.status_cadence.mark(now);
        }

        TickReport {
            link,
            session,
            commands,
            telemetry,
        }
    }

    pub fn run(&mut self) -> ! {
        info!("🚀 Bridge running");
        loop {
            self.tick();
            self.delay.delay_ms(IDLE_POLL_INTERVAL.as_millis() as u32);
        }
    }
}

#[cfg(test)]
mod scenarios;
