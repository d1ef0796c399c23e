//! ESP-IDF implementations of the bridge's link, transport, serial and timing seams.

pub mod mqtt;
pub mod uart;
pub mod wifi;

pub use mqtt::EspMqttTransport;
pub use uart::UartPort;
pub use wifi::WifiLink;

use crate::runner::Clock;
use embedded_hal::blocking::delay::DelayMs;
use esp_idf_hal::delay::FreeRtos;
use std::time::{Duration, Instant};

/// Task delay that yields to other FreeRTOS tasks
#[derive(Clone, Copy, Default)]
pub struct FreeRtosDelay;

impl DelayMs<u32> for FreeRtosDelay {
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

pub struct BootClock {
    start: Instant,
}

impl BootClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for BootClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
