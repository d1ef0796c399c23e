//! PZEM-004T v3.0 driver (Modbus-RTU over a 9600 8N1 serial line).
//!
//! Register map (input registers, function 0x04, 10 registers from 0x0000):
//!
//! | reg | value        | unit     |
//! |-----|--------------|----------|
//! | 0   | voltage      | 0.1 V    |
//! | 1-2 | current      | 0.001 A  |
//! | 3-4 | power        | 0.1 W    |
//! | 5-6 | energy       | 1 Wh     |
//! | 7   | frequency    | 0.1 Hz   |
//! | 8   | power factor | 0.01     |
//! | 9   | alarm status |          |
//!
//! 32-bit values are sent low word first.

use crate::error::{BridgeResult, SensorError};
use crate::sensor::{EnergySensor, Reading};
use log::{debug, warn};

const FN_READ_INPUT: u8 = 0x04;
const FN_RESET_ENERGY: u8 = 0x42;
const EXCEPTION_FLAG: u8 = 0x80;

const REGISTER_COUNT: u16 = 10;
const READ_REQUEST_LEN: usize = 8;
const READ_RESPONSE_LEN: usize = 3 + 2 * REGISTER_COUNT as usize + 2;
const RESET_REQUEST_LEN: usize = 4;
const EXCEPTION_RESPONSE_LEN: usize = 5;

/// Serial link to the meter
pub trait PzemPort {
    /// Write `request`, then read up to `response.len()` bytes.
    /// Returns the number of bytes read before the line went quiet.
    fn transfer(&mut self, request: &[u8], response: &mut [u8]) -> anyhow::Result<usize>;
}

/// CRC-16/MODBUS (reflected poly 0xA001, init 0xFFFF)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn append_crc(frame: &mut [u8]) {
    let body = frame.len() - 2;
    let crc = crc16(&frame[..body]);
    frame[body..].copy_from_slice(&crc.to_le_bytes());
}

fn crc_ok(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let body = frame.len() - 2;
    crc16(&frame[..body]).to_le_bytes() == frame[body..]
}

pub fn read_request(address: u8) -> [u8; READ_REQUEST_LEN] {
    let count = REGISTER_COUNT.to_be_bytes();
    let mut frame = [address, FN_READ_INPUT, 0x00, 0x00, count[0], count[1], 0, 0];
    append_crc(&mut frame);
    frame
}

pub fn reset_request(address: u8) -> [u8; RESET_REQUEST_LEN] {
    let mut frame = [address, FN_RESET_ENERGY, 0, 0];
    append_crc(&mut frame);
    frame
}

fn check_exception(frame: &[u8], function: u8) -> Result<(), SensorError> {
    if frame.len() == EXCEPTION_RESPONSE_LEN && frame[1] == function | EXCEPTION_FLAG {
        if !crc_ok(frame) {
            return Err(SensorError::CrcMismatch);
        }
        return Err(SensorError::Exception(frame[2]));
    }
    Ok(())
}

/// Decode a read-input-registers reply into engineering units
pub fn decode_measurements(frame: &[u8]) -> Result<Reading, SensorError> {
    check_exception(frame, FN_READ_INPUT)?;
    if frame.len() < READ_RESPONSE_LEN {
        return Err(SensorError::ShortResponse {
            got: frame.len(),
            expected: READ_RESPONSE_LEN,
        });
    }
    let frame = &frame[..READ_RESPONSE_LEN];
    if !crc_ok(frame) {
        return Err(SensorError::CrcMismatch);
    }
    if frame[1] != FN_READ_INPUT || frame[2] as u16 != 2 * REGISTER_COUNT {
        return Err(SensorError::UnexpectedReply);
    }

    let reg = |i: usize| u16::from_be_bytes([frame[3 + 2 * i], frame[4 + 2 * i]]) as u32;
    let wide = |lo: usize| reg(lo) | (reg(lo + 1) << 16);

    Ok(Reading {
        voltage: reg(0) as f32 / 10.0,
        current: wide(1) as f32 / 1000.0,
        power: wide(3) as f32 / 10.0,
        energy: wide(5) as f32 / 1000.0,
        frequency: reg(7) as f32 / 10.0,
        power_factor: reg(8) as f32 / 100.0,
    })
}

fn decode_reset_ack(frame: &[u8]) -> Result<(), SensorError> {
    check_exception(frame, FN_RESET_ENERGY)?;
    if frame.len() != RESET_REQUEST_LEN {
        return Err(SensorError::ShortResponse {
            got: frame.len(),
            expected: RESET_REQUEST_LEN,
        });
    }
    if !crc_ok(frame) {
        return Err(SensorError::CrcMismatch);
    }
    if frame[1] != FN_RESET_ENERGY {
        return Err(SensorError::UnexpectedReply);
    }
    Ok(())
}

pub struct Pzem004t<P> {
    port: P,
    address: u8,
    failed_reads: u32,
}

impl<P: PzemPort> Pzem004t<P> {
    pub fn new(port: P, address: u8) -> Self {
        Self {
            port,
            address,
            failed_reads: 0,
        }
    }

    pub fn failed_reads(&self) -> u32 {
        self.failed_reads
    }

    fn exchange(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, SensorError> {
        self.port.transfer(request, response).map_err(|e| {
            warn!("PZEM: serial transfer failed: {:?}", e);
            SensorError::Io
        })
    }

    pub fn try_read(&mut self) -> Result<Reading, SensorError> {
        let request = read_request(self.address);
        let mut response = [0u8; READ_RESPONSE_LEN];
        let n = self.exchange(&request, &mut response)?;
        decode_measurements(&response[..n])
    }
}

impl<P: PzemPort> EnergySensor for Pzem004t<P> {
    fn read(&mut self) -> Reading {
        match self.try_read() {
            Ok(reading) => {
                debug!("PZEM: {:?}", reading);
                reading
            }
            Err(e) => {
                self.failed_reads += 1;
                warn!(
                    "PZEM: read failed ({}), reporting NaN ({} failures since boot)",
                    e, self.failed_reads
                );
                Reading::UNAVAILABLE
            }
        }
    }

    fn reset_energy(&mut self) -> BridgeResult<()> {
        let request = reset_request(self.address);
        let mut response = [0u8; EXCEPTION_RESPONSE_LEN];
        let n = self.exchange(&request, &mut response)?;
        decode_reset_ack(&response[..n])?;
        Ok(())
    }
}
