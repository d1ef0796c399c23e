use crate::error::BridgeResult;
use serde::Serialize;

/// One sample from the meter. A field is NaN when the meter could not provide it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Volts
    pub voltage: f32,
    /// Amperes
    pub current: f32,
    /// Watts
    pub power: f32,
    /// Kilowatt-hours accumulated since the last reset
    pub energy: f32,
    /// Hertz
    pub frequency: f32,
    pub power_factor: f32,
}

impl Reading {
    pub const UNAVAILABLE: Reading = Reading {
        voltage: f32::NAN,
        current: f32::NAN,
        power: f32::NAN,
        energy: f32::NAN,
        frequency: f32::NAN,
        power_factor: f32::NAN,
    };
}

/// Wire form of a [`Reading`]: every field is a finite JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub energy: f32,
    pub frequency: f32,
    #[serde(rename = "pf")]
    pub power_factor: f32,
}

/// serde_json writes NaN and infinities as `null`
fn or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl From<Reading> for Snapshot {
    fn from(r: Reading) -> Self {
        Self {
            voltage: or_zero(r.voltage),
            current: or_zero(r.current),
            power: or_zero(r.power),
            energy: or_zero(r.energy),
            frequency: or_zero(r.frequency),
            power_factor: or_zero(r.power_factor),
        }
    }
}

/// The meter as seen by the bridge core
pub trait EnergySensor {
    fn read(&mut self) -> Reading;

    /// Zero the accumulated energy counter
    fn reset_energy(&mut self) -> BridgeResult<()>;
}
