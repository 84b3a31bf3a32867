//! Roll / pitch / yaw from a microcontroller on a USB serial line.
//!
//! The device prints one line per reading:
//!
//! ```text
//! <roll>,<pitch>,<yaw>\r\n
//! ```
//!
//! USB serial devices are renumbered when they are replugged, so `open`
//! walks an ordered list of candidate paths (`/dev/ttyACM0` … `/dev/ttyACM9`
//! by default) and keeps the first one that opens.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use telemetry_core::{MessageType, Orientation, TelemetrySample};
use tracing::{debug, info};

use crate::application::sample_reader::{SensorError, SensorSource};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How long one poll waits for a line before reporting an empty poll.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// `/dev/ttyACM0` through `/dev/ttyACM9`.
pub fn default_candidates() -> Vec<String> {
    (0..10).map(|n| format!("/dev/ttyACM{n}")).collect()
}

/// Parses a `roll,pitch,yaw` line.
///
/// # Errors
///
/// [`SensorError::Malformed`] for a wrong field count, a non-numeric field,
/// or a field that parses to NaN or infinity.
pub fn parse_rpy_line(line: &str) -> Result<Orientation, SensorError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(SensorError::Malformed(format!(
            "expected 3 comma-separated fields, got {}: {line:?}",
            fields.len()
        )));
    }

    let parse = |name: &str, text: &str| -> Result<f64, SensorError> {
        let value = text
            .parse::<f64>()
            .map_err(|e| SensorError::Malformed(format!("{name} {text:?}: {e}")))?;
        if !value.is_finite() {
            return Err(SensorError::Malformed(format!("{name} {text:?} is not finite")));
        }
        Ok(value)
    };
    Ok(Orientation {
        roll: parse("roll", fields[0])?,
        pitch: parse("pitch", fields[1])?,
        yaw: parse("yaw", fields[2])?,
    })
}

pub struct SerialOrientationSource {
    candidates: Vec<String>,
    baud_rate: u32,
    port: Option<BufReader<Box<dyn SerialPort>>>,
    line: String,
}

impl SerialOrientationSource {
    pub fn new(candidates: Vec<String>, baud_rate: u32) -> Self {
        Self {
            candidates,
            baud_rate,
            port: None,
            line: String::new(),
        }
    }
}

impl Default for SerialOrientationSource {
    fn default() -> Self {
        Self::new(default_candidates(), DEFAULT_BAUD_RATE)
    }
}

impl SensorSource for SerialOrientationSource {
    fn message_type(&self) -> MessageType {
        MessageType::Orientation
    }

    fn open(&mut self) -> Result<(), SensorError> {
        for path in &self.candidates {
            let opened = serialport::new(path.as_str(), self.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(READ_TIMEOUT)
                .open();
            match opened {
                Ok(port) => {
                    info!("opened orientation sensor on {path} at {} baud", self.baud_rate);
                    self.line.clear();
                    self.port = Some(BufReader::new(port));
                    return Ok(());
                }
                Err(e) => debug!("{path}: {e}"),
            }
        }
        Err(SensorError::Unavailable(format!(
            "none of {} serial candidates could be opened",
            self.candidates.len()
        )))
    }

    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SensorError::Unavailable("serial port not open".into()))?;

        match port.read_line(&mut self.line) {
            Ok(0) => Err(SensorError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial device closed",
            ))),
            Ok(_) => {
                let line = std::mem::take(&mut self.line);
                let line = line.trim_end_matches(['\r', '\n']);
                if line.trim().is_empty() {
                    return Ok(None);
                }
                parse_rpy_line(line).map(|o| Some(TelemetrySample::Orientation(o)))
            }
            // A partial line stays in `self.line` for the next poll.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                self.line.clear();
                Err(SensorError::Malformed(format!("non-UTF-8 serial data: {e}")))
            }
            Err(e) => Err(SensorError::Io(e)),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("orientation serial port closed");
        }
        self.line.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rpy_line_reads_three_floats() {
        let o = parse_rpy_line("1.5,-2.25,359.0").unwrap();
        assert_eq!(
            o,
            Orientation {
                roll: 1.5,
                pitch: -2.25,
                yaw: 359.0
            }
        );
    }

    #[test]
    fn test_parse_rpy_line_tolerates_spaces() {
        let o = parse_rpy_line(" 1 , 2 , 3 ").unwrap();
        assert_eq!(o.yaw, 3.0);
    }

    #[test]
    fn test_parse_rpy_line_rejects_wrong_field_count() {
        let result = parse_rpy_line("1.0,2.0");
        assert!(matches!(result, Err(SensorError::Malformed(_))));
    }

    #[test]
    fn test_parse_rpy_line_rejects_non_numeric_field() {
        let result = parse_rpy_line("1.0,abc,3.0");
        assert!(matches!(result, Err(SensorError::Malformed(_))));
    }

    #[test]
    fn test_parse_rpy_line_rejects_non_finite() {
        for line in ["nan,0.0,1.0", "0.0,inf,1.0", "0.0,0.0,-infinity", "nan,inf,1.0"] {
            let result = parse_rpy_line(line);
            assert!(
                matches!(result, Err(SensorError::Malformed(_))),
                "{line:?} should be malformed, got {result:?}"
            );
        }
    }

    #[test]
    fn test_default_candidates_cover_acm0_to_acm9() {
        let candidates = default_candidates();
        assert_eq!(candidates.len(), 10);
        assert_eq!(candidates[0], "/dev/ttyACM0");
        assert_eq!(candidates[9], "/dev/ttyACM9");
    }

    #[test]
    fn test_open_with_no_existing_candidate_is_unavailable() {
        let mut source = SerialOrientationSource::new(
            vec!["/nonexistent/tty-telemetry-test".into()],
            DEFAULT_BAUD_RATE,
        );

        let result = source.open();

        assert!(matches!(result, Err(SensorError::Unavailable(_))));
    }
}
