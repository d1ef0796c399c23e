use crate::config::LINK_RETRY_INTERVAL;
use embedded_hal::blocking::delay::DelayMs;
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Up,
}

/// Network association underneath the broker session (WiFi station on the device)
pub trait NetworkLink {
    fn is_up(&self) -> bool;

    /// One association attempt
    fn establish(&mut self) -> anyhow::Result<()>;
}

pub struct LinkManager<L> {
    link: L,
    state: LinkState,
    attempts: u32,
}

impl<L: NetworkLink> LinkManager<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: LinkState::Down,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Total association attempts since boot
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Blocks until the link is up. Nothing else on the device is useful without it.
    pub fn ensure_link<D: DelayMs<u32>>(&mut self, delay: &mut D) -> LinkState {
        if self.link.is_up() {
            if self.state == LinkState::Down {
                info!("🌐 Link: up");
                self.state = LinkState::Up;
            }
            return self.state;
        }

        if self.state == LinkState::Up {
            warn!("🔌 Link: lost");
            self.state = LinkState::Down;
        }

        info!("🌐 Link: connecting...");
        loop {
            self.attempts += 1;
            match self.link.establish() {
                Ok(()) if self.link.is_up() => break,
                Ok(()) => {}
                Err(e) => warn!("❌ Link: attempt {} failed: {:?}", self.attempts, e),
            }
            delay.delay_ms(LINK_RETRY_INTERVAL.as_millis() as u32);
        }

        info!("✅ Link: up after {} attempt(s)", self.attempts);
        self.state = LinkState::Up;
        self.state
    }
}
