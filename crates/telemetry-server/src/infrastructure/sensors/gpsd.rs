//! GPS fixes from a running `gpsd` daemon.
//!
//! gpsd speaks newline-delimited JSON over TCP (port 2947 by default).  After
//! connecting we enable watch mode:
//!
//! ```text
//! ?WATCH={"enable":true,"json":true};
//! ```
//!
//! and the daemon starts streaming reports such as `VERSION`, `DEVICES`,
//! `SKY` and `TPV`.  Only `TPV` ("time-position-velocity") reports carry a
//! fix; every other class is skipped.
//!
//! # Read timeout
//!
//! The socket has a short read timeout.  A poll that times out before a TPV
//! arrives is an empty poll, not an error.  A partially received line is
//! kept in the buffer and completed on the next poll.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;
use telemetry_core::{GpsFix, MessageType, TelemetrySample};
use tracing::{debug, info};

use crate::application::sample_reader::{SensorError, SensorSource};

pub const DEFAULT_GPSD_HOST: &str = "127.0.0.1";
pub const DEFAULT_GPSD_PORT: u16 = 2947;

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_millis(250);
/// Most report lines examined in one poll while looking for a TPV.
const MAX_LINES_PER_POLL: usize = 16;

/// One gpsd report: the class tag plus, for TPV, the fix fields.
#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(flatten)]
    fix: GpsFix,
}

/// Parses one report line.  `Ok(None)` for classes other than `TPV`.
fn parse_report(line: &str) -> Result<Option<GpsFix>, SensorError> {
    let report: Report = serde_json::from_str(line)
        .map_err(|e| SensorError::Malformed(format!("gpsd report: {e}")))?;
    if report.class == "TPV" {
        Ok(Some(report.fix))
    } else {
        Ok(None)
    }
}

pub struct GpsdSource {
    host: String,
    port: u16,
    stream: Option<BufReader<TcpStream>>,
    line: String,
}

impl GpsdSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            line: String::new(),
        }
    }

    fn connect(&self) -> Result<TcpStream, SensorError> {
        let target = format!("{}:{}", self.host, self.port);
        let addrs = target
            .to_socket_addrs()
            .map_err(|e| SensorError::Unavailable(format!("cannot resolve {target}: {e}")))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(SensorError::Unavailable(match last_error {
            Some(e) => format!("gpsd at {target}: {e}"),
            None => format!("gpsd at {target}: no addresses"),
        }))
    }
}

impl Default for GpsdSource {
    fn default() -> Self {
        Self::new(DEFAULT_GPSD_HOST, DEFAULT_GPSD_PORT)
    }
}

impl SensorSource for GpsdSource {
    fn message_type(&self) -> MessageType {
        MessageType::Gps
    }

    fn open(&mut self) -> Result<(), SensorError> {
        let mut stream = self.connect()?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.write_all(WATCH_COMMAND)?;
        info!("watching gpsd at {}:{}", self.host, self.port);
        self.line.clear();
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError> {
        let reader = self
            .stream
            .as_mut()
            .ok_or_else(|| SensorError::Unavailable("gpsd session not open".into()))?;

        for _ in 0..MAX_LINES_PER_POLL {
            match reader.read_line(&mut self.line) {
                Ok(0) => {
                    return Err(SensorError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "gpsd closed the session",
                    )))
                }
                Ok(_) => {
                    let line = std::mem::take(&mut self.line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(fix) = parse_report(line)? {
                        return Ok(Some(TelemetrySample::Gps(fix)));
                    }
                    debug!("skipping non-TPV gpsd report");
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(SensorError::Io(e)),
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("gpsd session closed");
        }
        self.line.clear();
    }
}
