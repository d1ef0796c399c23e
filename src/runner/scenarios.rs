//! Whole-bridge scenarios driven through `Runner::tick` with simulated time.

use super::Runner;
use crate::command::{CommandOutcome, RESET_ACK};
use crate::config::{BridgeConfig, SESSION_BACKOFF, TELEMETRY_CADENCE};
use crate::error::BridgeError;
use crate::inbox::{inbox, InboxSender};
use crate::link::LinkState;
use crate::pzem::{crc16, Pzem004t, PzemPort};
use crate::sensor::{EnergySensor, Reading};
use crate::session::SessionState;
use crate::sim::{ManualClock, SimBroker, SimLink, SimSensor};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;

const TELEMETRY: &str = "testtopic/pzem004t";
const COMMAND: &str = "testtopic/pzem004t/cmd";

fn bridge<S: EnergySensor>(
    link: &SimLink,
    broker: &SimBroker,
    sensor: S,
) -> (
    Runner<SimLink, SimBroker, S, ManualClock, ManualClock>,
    InboxSender,
    ManualClock,
) {
    let (tx, rx) = inbox(8);
    let clock = ManualClock::new();
    let runner = Runner::new(
        &BridgeConfig::default(),
        link.clone(),
        broker.clone(),
        sensor,
        rx,
        clock.clone(),
        clock.clone(),
    );
    (runner, tx, clock)
}

fn json(payload: &[u8]) -> Value {
    serde_json::from_slice(payload).unwrap()
}

#[test]
fn steady_state_publishes_once_per_cadence() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    let (mut runner, _tx, clock) = bridge(&link, &broker, sensor.clone());

    // ten minutes of 100 ms idle polls
    for _ in 0..6000 {
        runner.tick();
        clock.advance(std::time::Duration::from_millis(100));
    }

    let expected = 600_000 / TELEMETRY_CADENCE.as_millis() as usize;
    let published = broker.published();
    assert_eq!(published.len(), expected);
    assert!(published.iter().all(|(topic, _)| topic == TELEMETRY));
    assert_eq!(runner.status().broker.connect_attempts, 1);
}

#[test]
fn nan_reading_is_published_as_zero() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    sensor.set_reading(Reading {
        voltage: 220.1,
        current: f32::NAN,
        power: 10.0,
        energy: 5.2,
        frequency: 50.0,
        power_factor: 0.98,
    });
    let (mut runner, _tx, _clock) = bridge(&link, &broker, sensor);

    runner.tick();

    let doc = json(&broker.published()[0].1);
    assert_eq!(doc["current"].as_f64(), Some(0.0));
    assert!((doc["voltage"].as_f64().unwrap() - 220.1).abs() < 1e-3);
    assert!((doc["power"].as_f64().unwrap() - 10.0).abs() < 1e-6);
    assert!((doc["energy"].as_f64().unwrap() - 5.2).abs() < 1e-6);
    assert!((doc["frequency"].as_f64().unwrap() - 50.0).abs() < 1e-6);
    assert!((doc["pf"].as_f64().unwrap() - 0.98).abs() < 1e-6);
}

#[test]
fn reset_command_round_trip() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    let (mut runner, tx, clock) = bridge(&link, &broker, sensor.clone());
    runner.tick();

    tx.deliver(COMMAND, br#"{"reset":true}"#);
    clock.advance(TELEMETRY_CADENCE);
    let report = runner.tick();

    assert_eq!(report.commands, vec![CommandOutcome::ResetAcknowledged]);
    assert_eq!(sensor.resets(), 1);

    let published = broker.published();
    assert_eq!(published.len(), 3);
    assert_eq!(published[1], (TELEMETRY.to_string(), RESET_ACK.to_vec()));
    // the sample taken after the reset already shows the cleared counter
    assert_eq!(json(&published[2].1)["energy"].as_f64(), Some(0.0));
}

#[test]
fn ignored_commands_have_no_effect() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    let (mut runner, tx, _clock) = bridge(&link, &broker, sensor.clone());
    runner.tick();
    let before = broker.publish_calls();

    tx.deliver(COMMAND, br#"{"reset":false}"#);
    tx.deliver(COMMAND, b"not json");
    tx.deliver(COMMAND, br#"{"reset":"yes"}"#);
    let report = runner.tick();

    assert_eq!(report.commands, vec![CommandOutcome::Ignored; 3]);
    assert_eq!(sensor.resets(), 0);
    assert_eq!(broker.publish_calls(), before);
}

#[test]
fn unreachable_broker_backs_off_without_publishing() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    broker.fail_connects(3);
    let (mut runner, _tx, clock) = bridge(&link, &broker, sensor.clone());

    for attempt in 1..=3u64 {
        let report = runner.tick();
        assert_eq!(report.link, LinkState::Up);
        assert_eq!(report.session, SessionState::Disconnected);
        assert_eq!(report.telemetry, None);
        assert_eq!(clock.elapsed_ms(), attempt * SESSION_BACKOFF.as_millis() as u64);
    }
    assert_eq!(broker.publish_calls(), 0);
    assert_eq!(sensor.reads(), 0);

    let report = runner.tick();
    assert_eq!(report.session, SessionState::Connected);
    assert_eq!(report.telemetry, Some(Ok(())));
    assert_eq!(broker.subscriptions(), vec![COMMAND.to_string()]);
}

#[test]
fn reset_while_disconnected_loses_only_the_ack() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    broker.fail_connects(1);
    let (mut runner, tx, _clock) = bridge(&link, &broker, sensor.clone());

    tx.deliver(COMMAND, br#"{"reset":true}"#);
    let report = runner.tick();

    assert_eq!(report.session, SessionState::Disconnected);
    assert_eq!(report.commands, vec![CommandOutcome::ResetUnacknowledged]);
    assert_eq!(sensor.resets(), 1);
    assert_eq!(broker.publish_calls(), 0);

    // the lost acknowledgment is not replayed after reconnecting
    runner.tick();
    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_ne!(published[0].1, RESET_ACK.to_vec());
}

#[test]
fn broker_drop_is_recovered_with_resubscribe() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    let (mut runner, _tx, clock) = bridge(&link, &broker, sensor);
    runner.tick();

    broker.drop_connection();
    clock.advance(TELEMETRY_CADENCE);
    let report = runner.tick();

    assert_eq!(report.session, SessionState::Connected);
    assert_eq!(report.telemetry, Some(Ok(())));
    assert_eq!(broker.subscriptions().len(), 2);
    assert_eq!(runner.status().broker.connects, 2);
}

#[test]
fn link_outage_blocks_until_reassociated() {
    let (link, broker, sensor) = (SimLink::down(), SimBroker::new(), SimSensor::new());
    link.fail_next(4);
    let (mut runner, _tx, _clock) = bridge(&link, &broker, sensor);

    let report = runner.tick();
    assert_eq!(report.link, LinkState::Up);
    assert_eq!(link.establish_calls(), 5);
    assert_eq!(runner.status().link_attempts, 5);
}

#[test]
fn telemetry_publish_failure_is_not_retried() {
    let (link, broker, sensor) = (SimLink::up(), SimBroker::new(), SimSensor::new());
    let (mut runner, _tx, clock) = bridge(&link, &broker, sensor);
    broker.fail_publishes(1);

    let report = runner.tick();
    assert!(matches!(report.telemetry, Some(Err(BridgeError::Transport(_)))));

    clock.advance(TELEMETRY_CADENCE / 2);
    assert_eq!(runner.tick().telemetry, None);
    clock.advance(TELEMETRY_CADENCE / 2);
    assert_eq!(runner.tick().telemetry, Some(Ok(())));
    let status = runner.status();
    assert_eq!((status.published, status.dropped), (1, 1));
}

/// Register-level stand-in for a PZEM-004T on the serial line
#[derive(Clone)]
struct FakeMeter {
    energy_wh: Rc<Cell<u32>>,
    online: Rc<Cell<bool>>,
}

impl FakeMeter {
    fn new(energy_wh: u32) -> Self {
        Self {
            energy_wh: Rc::new(Cell::new(energy_wh)),
            online: Rc::new(Cell::new(true)),
        }
    }

    fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }
}

impl PzemPort for FakeMeter {
    fn transfer(&mut self, request: &[u8], response: &mut [u8]) -> anyhow::Result<usize> {
        if !self.online.get() {
            return Ok(0);
        }
        let reply = match request[1] {
            0x04 => {
                let energy = self.energy_wh.get();
                let regs: [u16; 10] = [
                    2301,
                    2500,
                    0,
                    5750,
                    0,
                    (energy & 0xFFFF) as u16,
                    (energy >> 16) as u16,
                    499,
                    100,
                    0,
                ];
                let mut frame = vec![request[0], 0x04, 20];
                for r in regs {
                    frame.extend_from_slice(&r.to_be_bytes());
                }
                Self::with_crc(frame)
            }
            0x42 => {
                self.energy_wh.set(0);
                request.to_vec()
            }
            _ => Self::with_crc(vec![request[0], request[1] | 0x80, 0x01]),
        };
        let n = reply.len().min(response.len());
        response[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

#[test]
fn pzem_driver_end_to_end() {
    let meter = FakeMeter::new(123_456);
    let (link, broker) = (SimLink::up(), SimBroker::new());
    let pzem = Pzem004t::new(meter.clone(), 0xF8);
    let (mut runner, tx, clock) = bridge(&link, &broker, pzem);

    runner.tick();
    let first = json(&broker.published()[0].1);
    assert!((first["voltage"].as_f64().unwrap() - 230.1).abs() < 1e-3);
    assert!((first["current"].as_f64().unwrap() - 2.5).abs() < 1e-6);
    assert!((first["power"].as_f64().unwrap() - 575.0).abs() < 1e-3);
    assert!((first["energy"].as_f64().unwrap() - 123.456).abs() < 1e-3);
    assert!((first["frequency"].as_f64().unwrap() - 49.9).abs() < 1e-3);
    assert_eq!(first["pf"].as_f64(), Some(1.0));

    tx.deliver(COMMAND, br#"{"reset":true}"#);
    clock.advance(TELEMETRY_CADENCE);
    runner.tick();
    assert_eq!(meter.energy_wh.get(), 0);

    // meter unplugged: fields go NaN on the device and 0 on the wire
    meter.online.set(false);
    clock.advance(TELEMETRY_CADENCE);
    runner.tick();
    let published = broker.published();
    let last = json(&published.last().unwrap().1);
    assert!(last.as_object().unwrap().values().all(|v| v.as_f64() == Some(0.0)));
}
