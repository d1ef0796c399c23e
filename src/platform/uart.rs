use crate::pzem::PzemPort;
use anyhow::Result;
use esp_idf_hal::delay::TickType;
use esp_idf_hal::uart::UartDriver;

/// PZEM answers well within this at 9600 baud
const RESPONSE_TIMEOUT_MS: u64 = 100;

pub struct UartPort<'d> {
    uart: UartDriver<'d>,
}

impl<'d> UartPort<'d> {
    pub fn new(uart: UartDriver<'d>) -> Self {
        Self { uart }
    }
}

impl PzemPort for UartPort<'_> {
    fn transfer(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize> {
        // stale bytes from a previous timed-out exchange would shift the frame
        self.uart.clear_rx()?;
        self.uart.write(request)?;

        let timeout = TickType::new_millis(RESPONSE_TIMEOUT_MS).ticks();
        let mut received = 0;
        while received < response.len() {
            let n = self.uart.read(&mut response[received..], timeout)?;
            if n == 0 {
                break;
            }
            received += n;
        }
        Ok(received)
    }
}
