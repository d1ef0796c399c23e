//! Meter stand-in for bench testing the bridge without a PZEM on the serial line.
//!
//! Load follows a daily curve (lowest at midnight, highest at noon) with
//! uniform noise on top; the energy counter integrates power over the time
//! between two reads.

use crate::error::BridgeResult;
use crate::runner::Clock;
use crate::sensor::{EnergySensor, Reading};
use anyhow::Context;
use log::info;
use rand::prelude::*;
use rand_distr::Normal;
use std::f64::consts::PI;
use std::time::Duration;

const SECONDS_PER_DAY: f64 = 86_400.0;
const VOLTAGE_JITTER: f64 = 2.0;
const FREQUENCY_JITTER: f64 = 0.05;
const PF_SIGMA: f64 = 0.02;

#[derive(Debug, Clone, Copy)]
pub struct MeterProfile {
    /// Mean load in W
    pub base_power: f64,
    /// Load noise amplitude in W; 30% of it is applied per sample
    pub variance: f64,
    pub power_factor: f64,
    pub voltage: f64,
    pub frequency: f64,
    /// kWh on the counter at boot
    pub start_energy: f64,
    /// Time of day at boot, there is no RTC to ask
    pub day_offset: Duration,
}

impl Default for MeterProfile {
    fn default() -> Self {
        Self {
            base_power: 350.0,
            variance: 150.0,
            power_factor: 0.92,
            voltage: 227.0,
            frequency: 50.0,
            start_energy: 0.0,
            day_offset: Duration::ZERO,
        }
    }
}

pub struct SimulatedMeter<C> {
    profile: MeterProfile,
    clock: C,
    rng: StdRng,
    pf_noise: Normal<f64>,
    energy: f64,
    last_read: Option<Duration>,
}

impl<C: Clock> SimulatedMeter<C> {
    pub fn new(profile: MeterProfile, clock: C, rng: StdRng) -> anyhow::Result<Self> {
        anyhow::ensure!(
            profile.power_factor.is_finite(),
            "power factor must be a finite number"
        );
        let pf_noise = Normal::new(profile.power_factor, PF_SIGMA).context("power factor noise")?;
        info!(
            "🎲 Simulated meter: {} W ±{} W, {} V, pf {}",
            profile.base_power, profile.variance, profile.voltage, profile.power_factor
        );
        Ok(Self {
            profile,
            clock,
            rng,
            pf_noise,
            energy: profile.start_energy,
            last_read: None,
        })
    }

    pub fn seeded(profile: MeterProfile, clock: C, seed: u64) -> anyhow::Result<Self> {
        Self::new(profile, clock, StdRng::seed_from_u64(seed))
    }

    /// 0.5 at midnight, 1.0 at noon
    fn diurnal(&self, now: Duration) -> f64 {
        let seconds = (self.profile.day_offset + now).as_secs_f64() % SECONDS_PER_DAY;
        let phase = seconds / SECONDS_PER_DAY * 2.0 * PI;
        0.25 * (phase - PI / 2.0).sin() + 0.75
    }
}

impl<C: Clock> EnergySensor for SimulatedMeter<C> {
    fn read(&mut self) -> Reading {
        let now = self.clock.now();
        let dt = self
            .last_read
            .map(|last| now.saturating_sub(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_read = Some(now);

        let noise = self.rng.gen_range(-1.0..=1.0);
        let power = (self.profile.base_power * self.diurnal(now)
            + self.profile.variance * 0.3 * noise)
            .max(0.0);
        let pf = self.pf_noise.sample(&mut self.rng).clamp(0.5, 1.0);
        let current = if self.profile.voltage > 0.0 {
            power / (self.profile.voltage * pf)
        } else {
            0.0
        };
        self.energy += power * dt / 3_600_000.0;

        Reading {
            voltage: (self.profile.voltage
                + self.rng.gen_range(-VOLTAGE_JITTER..=VOLTAGE_JITTER)) as f32,
            current: current as f32,
            power: power as f32,
            energy: self.energy as f32,
            frequency: (self.profile.frequency
                + self.rng.gen_range(-FREQUENCY_JITTER..=FREQUENCY_JITTER))
                as f32,
            power_factor: pf as f32,
        }
    }

    fn reset_energy(&mut self) -> BridgeResult<()> {
        info!("🎲 Simulated meter: energy counter cleared at {:.3} kWh", self.energy);
        self.energy = 0.0;
        Ok(())
    }
}
