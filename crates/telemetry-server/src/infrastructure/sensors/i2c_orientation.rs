//! Roll / pitch / yaw from a microcontroller on a Linux I2C bus.
//!
//! Transaction per poll:
//!
//! 1. write the single command byte `1` ("sample the IMU now");
//! 2. wait a settle delay (200 ms) while the device measures;
//! 3. read 12 bytes: roll, pitch and yaw as little-endian `f32`.
//!
//! A transfer shorter than 12 bytes means the bus or device is unhealthy and
//! is reported as an I/O error, so the reader reopens the bus.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use telemetry_core::{MessageType, Orientation, TelemetrySample};
use tracing::{debug, info};

use crate::application::sample_reader::{SensorError, SensorSource};

pub const DEFAULT_I2C_BUS: u8 = 1;
pub const DEFAULT_I2C_ADDRESS: u16 = 0x05;
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

/// `I2C_SLAVE` request from `<linux/i2c-dev.h>`.
const I2C_SLAVE: libc::c_ulong = 0x0703;
const SAMPLE_COMMAND: u8 = 1;
const SAMPLE_LEN: usize = 12;

/// Decodes the 12-byte sample block.
pub fn decode_sample(block: &[u8; SAMPLE_LEN]) -> Result<Orientation, SensorError> {
    let axis = |i: usize| {
        f32::from_le_bytes([block[i], block[i + 1], block[i + 2], block[i + 3]])
    };
    let (roll, pitch, yaw) = (axis(0), axis(4), axis(8));
    if !(roll.is_finite() && pitch.is_finite() && yaw.is_finite()) {
        return Err(SensorError::Malformed(format!(
            "non-finite I2C sample {roll}, {pitch}, {yaw}"
        )));
    }
    Ok(Orientation {
        roll: f64::from(roll),
        pitch: f64::from(pitch),
        yaw: f64::from(yaw),
    })
}

pub struct I2cOrientationSource {
    bus: u8,
    address: u16,
    settle: Duration,
    device: Option<File>,
}

impl I2cOrientationSource {
    pub fn new(bus: u8, address: u16) -> Self {
        Self {
            bus,
            address,
            settle: DEFAULT_SETTLE,
            device: None,
        }
    }

    fn path(&self) -> String {
        format!("/dev/i2c-{}", self.bus)
    }
}

impl Default for I2cOrientationSource {
    fn default() -> Self {
        Self::new(DEFAULT_I2C_BUS, DEFAULT_I2C_ADDRESS)
    }
}

impl SensorSource for I2cOrientationSource {
    fn message_type(&self) -> MessageType {
        MessageType::Orientation
    }

    fn open(&mut self) -> Result<(), SensorError> {
        let path = self.path();
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| SensorError::Unavailable(format!("{path}: {e}")))?;

        // SAFETY: `device` is an open file descriptor for the lifetime of the
        // call, and I2C_SLAVE takes the 7-bit address by value.
        let rc = unsafe {
            libc::ioctl(
                device.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(self.address),
            )
        };
        if rc < 0 {
            return Err(SensorError::Unavailable(format!(
                "{path}: cannot select address {:#04x}: {}",
                self.address,
                std::io::Error::last_os_error()
            )));
        }

        info!("opened orientation sensor on {path} at address {:#04x}", self.address);
        self.device = Some(device);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| SensorError::Unavailable("I2C bus not open".into()))?;

        device.write_all(&[SAMPLE_COMMAND])?;
        std::thread::sleep(self.settle);

        let mut block = [0u8; SAMPLE_LEN];
        let n = device.read(&mut block)?;
        if n != SAMPLE_LEN {
            return Err(SensorError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short I2C read: {n} of {SAMPLE_LEN} bytes"),
            )));
        }

        decode_sample(&block).map(|o| Some(TelemetrySample::Orientation(o)))
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("I2C bus {} closed", self.bus);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(roll: f32, pitch: f32, yaw: f32) -> [u8; SAMPLE_LEN] {
        let mut out = [0u8; SAMPLE_LEN];
        out[0..4].copy_from_slice(&roll.to_le_bytes());
        out[4..8].copy_from_slice(&pitch.to_le_bytes());
        out[8..12].copy_from_slice(&yaw.to_le_bytes());
        out
    }

    #[test]
    fn test_decode_sample_reads_little_endian_floats() {
        let o = decode_sample(&block(1.5, -0.5, 270.0)).unwrap();
        assert_eq!(o.roll, 1.5);
        assert_eq!(o.pitch, -0.5);
        assert_eq!(o.yaw, 270.0);
    }

    #[test]
    fn test_decode_sample_rejects_nan() {
        let result = decode_sample(&block(f32::NAN, 0.0, 0.0));
        assert!(matches!(result, Err(SensorError::Malformed(_))));
    }

    #[test]
    fn test_open_missing_bus_is_unavailable() {
        let mut source = I2cOrientationSource::new(250, DEFAULT_I2C_ADDRESS);
        assert!(matches!(source.open(), Err(SensorError::Unavailable(_))));
    }
}
