//! Sample reader: one poll loop per sensor.
//!
//! A [`SampleReader`] owns a single [`SensorSource`] and turns its readings
//! into queued [`Message`]s.  It runs on its own OS thread because sensor
//! drivers (serial ports, I2C, blocking sockets) are synchronous.
//!
//! # State machine
//!
//! ```text
//!             open ok                 I/O error
//! ACQUIRING ──────────▶ POLLING ──────────────────▶ RECOVERING
//!    ▲  │ open failed      │ sample / empty /            │ close, wait backoff
//!    │  └─ wait retry ─┘   │ malformed: stay             │
//!    └─────────────────────┴─────────────────────────────┘
//!
//! any state ── stop signal ──▶ SHUTDOWN (close source, exit)
//! ```
//!
//! # Failure policy
//!
//! Sensor I/O errors never leave the reader: they trigger a reconnect and
//! the server simply sees fewer samples of that kind.  Malformed readings are
//! logged and discarded without touching the link.
//!
//! # Testability
//!
//! [`SampleReader::step`] performs exactly one transition and returns how long
//! the loop should wait before the next one, without sleeping itself.  Unit
//! tests drive the machine step by step against a mocked source; only
//! [`SampleReader::run`] actually sleeps.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use telemetry_core::{Message, MessageType, TelemetrySample};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::outbound_queue::OutboundQueue;
use crate::application::stop_signal::StopSignal;

/// Longest uninterrupted sleep; bounds how late a stop signal is noticed.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

// ── Sensor capability ─────────────────────────────────────────────────────────

/// Errors a sensor backend may report.
#[derive(Debug, Error)]
pub enum SensorError {
    /// No candidate device could be opened.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    /// The link to the device failed.  Triggers a reconnect.
    #[error("sensor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link is fine but one reading could not be parsed.  Discarded.
    #[error("malformed reading: {0}")]
    Malformed(String),
}

impl SensorError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, SensorError::Malformed(_))
    }
}

/// A device (or daemon) that yields at most one sample per poll.
///
/// Implementations live in `infrastructure::sensors`; tests use the generated
/// `MockSensorSource` or the scripted source in that module.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send {
    /// The wire tag this source's samples are broadcast under.
    fn message_type(&self) -> MessageType;

    /// Acquires the underlying device, probing candidates if there are several.
    fn open(&mut self) -> Result<(), SensorError>;

    /// Reads once.  `Ok(None)` means the source had nothing new.
    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError>;

    /// Releases the device.  Must be safe to call when nothing is open.
    fn close(&mut self);
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn message_type(&self) -> MessageType {
        (**self).message_type()
    }

    fn open(&mut self) -> Result<(), SensorError> {
        (**self).open()
    }

    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError> {
        (**self).poll()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Current position in the reader state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Acquiring,
    Polling,
    Recovering,
    Shutdown,
}

/// Per-reader timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderTiming {
    /// Interval between polls while in `POLLING`.
    pub poll_period: Duration,
    /// Wait after a failed `open` before trying again.
    pub retry_delay: Duration,
    /// Wait in `RECOVERING` after closing a failed source.
    pub backoff: Duration,
}

impl Default for ReaderTiming {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(100),
            retry_delay: Duration::from_secs(1),
            backoff: Duration::from_secs(1),
        }
    }
}

/// Counters reported when a reader exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub samples_emitted: u64,
    pub reconnects: u64,
}

/// Drives one [`SensorSource`] and feeds the [`OutboundQueue`].
pub struct SampleReader<S: SensorSource> {
    source: S,
    queue: Arc<OutboundQueue>,
    timing: ReaderTiming,
    stop: StopSignal,
    state: ReaderState,
    stats: ReaderStats,
}

impl<S: SensorSource> SampleReader<S> {
    pub fn new(
        source: S,
        queue: Arc<OutboundQueue>,
        timing: ReaderTiming,
        stop: StopSignal,
    ) -> Self {
        Self {
            source,
            queue,
            timing,
            stop,
            state: ReaderState::Acquiring,
            stats: ReaderStats::default(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn samples_emitted(&self) -> u64 {
        self.stats.samples_emitted
    }

    pub fn reconnects(&self) -> u64 {
        self.stats.reconnects
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Performs one state transition and returns the delay before the next.
    pub fn step(&mut self) -> Duration {
        match self.state {
            ReaderState::Acquiring => self.acquire(),
            ReaderState::Polling => self.poll_once(),
            ReaderState::Recovering => self.recover(),
            ReaderState::Shutdown => Duration::ZERO,
        }
    }

    /// Enters `SHUTDOWN`, closing the source if it may be open.
    pub fn shutdown(&mut self) {
        if matches!(self.state, ReaderState::Polling | ReaderState::Recovering) {
            self.source.close();
        }
        self.state = ReaderState::Shutdown;
    }

    /// Runs until the stop signal is raised, then shuts down.
    ///
    /// The stop signal is checked once per step and between sleep slices.
    pub fn run(mut self) -> ReaderStats {
        let kind = self.source.message_type();
        info!("{kind} reader started");

        while !self.stop.is_raised() {
            let delay = self.step();
            sleep_unless_stopped(delay, &self.stop);
        }

        self.shutdown();
        info!(
            "{kind} reader stopped ({} samples, {} reconnects)",
            self.stats.samples_emitted, self.stats.reconnects
        );
        self.stats
    }

    fn acquire(&mut self) -> Duration {
        match self.source.open() {
            Ok(()) => {
                info!("{} source acquired", self.source.message_type());
                self.state = ReaderState::Polling;
                Duration::ZERO
            }
            Err(e) => {
                debug!(
                    "{} source not available, retrying in {:?}: {e}",
                    self.source.message_type(),
                    self.timing.retry_delay
                );
                self.timing.retry_delay
            }
        }
    }

    fn poll_once(&mut self) -> Duration {
        let kind = self.source.message_type();
        match self.source.poll() {
            Ok(Some(sample)) => {
                if sample.message_type() != kind {
                    warn!(
                        "{kind} source produced a {} sample, discarding",
                        sample.message_type()
                    );
                } else {
                    self.enqueue(&sample);
                }
                self.timing.poll_period
            }
            Ok(None) => self.timing.poll_period,
            Err(e) if e.is_malformed() => {
                warn!("{kind} reading discarded: {e}");
                self.timing.poll_period
            }
            Err(e) => {
                warn!("{kind} source lost: {e}");
                self.state = ReaderState::Recovering;
                Duration::ZERO
            }
        }
    }

    fn recover(&mut self) -> Duration {
        self.source.close();
        self.stats.reconnects += 1;
        self.state = ReaderState::Acquiring;
        self.timing.backoff
    }

    fn enqueue(&mut self, sample: &TelemetrySample) {
        match sample.to_message() {
            Ok(message) => {
                self.push(message);
            }
            Err(e) => warn!("could not serialize {} sample: {e}", sample.message_type()),
        }
    }

    fn push(&mut self, message: Message) {
        debug!(
            "queued {} sample ({} bytes)",
            message.message_type(),
            message.payload().len()
        );
        self.queue.push(message);
        self.stats.samples_emitted += 1;
    }
}

impl<S: SensorSource + 'static> SampleReader<S> {
    /// Moves the reader onto a named OS thread and starts [`SampleReader::run`].
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn(self, name: String) -> std::io::Result<JoinHandle<ReaderStats>> {
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
    }
}

/// Sleeps for `total`, waking early if `stop` is raised.
fn sleep_unless_stopped(total: Duration, stop: &StopSignal) {
    let deadline = Instant::now() + total;
    loop {
        if stop.is_raised() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::{GpsFix, Orientation};

    fn timing() -> ReaderTiming {
        ReaderTiming {
            poll_period: Duration::from_millis(100),
            retry_delay: Duration::from_millis(300),
            backoff: Duration::from_millis(500),
        }
    }

    fn gps_mock() -> MockSensorSource {
        let mut source = MockSensorSource::new();
        source
            .expect_message_type()
            .return_const(MessageType::Gps);
        source
    }

    fn make_reader(source: MockSensorSource) -> (SampleReader<MockSensorSource>, Arc<OutboundQueue>) {
        let queue = Arc::new(OutboundQueue::unbounded());
        let reader = SampleReader::new(source, Arc::clone(&queue), timing(), StopSignal::new());
        (reader, queue)
    }

    fn fix(lat: f64) -> TelemetrySample {
        TelemetrySample::Gps(GpsFix {
            lat: Some(lat),
            ..GpsFix::default()
        })
    }

    #[test]
    fn test_reader_starts_in_acquiring() {
        let (reader, _) = make_reader(gps_mock());
        assert_eq!(reader.state(), ReaderState::Acquiring);
    }

    #[test]
    fn test_failed_open_stays_acquiring_and_waits_retry_delay() {
        // Arrange
        let mut source = gps_mock();
        source
            .expect_open()
            .times(1)
            .returning(|| Err(SensorError::Unavailable("no device".into())));
        let (mut reader, _) = make_reader(source);

        // Act
        let delay = reader.step();

        // Assert
        assert_eq!(reader.state(), ReaderState::Acquiring);
        assert_eq!(delay, timing().retry_delay);
    }

    #[test]
    fn test_successful_open_moves_to_polling() {
        let mut source = gps_mock();
        source.expect_open().times(1).returning(|| Ok(()));
        let (mut reader, _) = make_reader(source);

        reader.step();

        assert_eq!(reader.state(), ReaderState::Polling);
    }

    #[test]
    fn test_poll_with_sample_enqueues_message_with_source_tag() {
        // Arrange
        let mut source = gps_mock();
        source.expect_open().returning(|| Ok(()));
        source.expect_poll().times(1).returning(|| Ok(Some(fix(45.0))));
        let (mut reader, queue) = make_reader(source);
        reader.step();

        // Act
        let delay = reader.step();

        // Assert
        assert_eq!(delay, timing().poll_period);
        assert_eq!(reader.samples_emitted(), 1);
        let message = queue.pop().expect("a message must be queued");
        assert_eq!(message.message_type(), MessageType::Gps);
        assert_eq!(message.payload(), br#"{"lat":45.0}"#);
    }

    #[test]
    fn test_empty_poll_enqueues_nothing() {
        let mut source = gps_mock();
        source.expect_open().returning(|| Ok(()));
        source.expect_poll().times(3).returning(|| Ok(None));
        let (mut reader, queue) = make_reader(source);
        reader.step();

        for _ in 0..3 {
            reader.step();
        }

        assert!(queue.is_empty());
        assert_eq!(reader.state(), ReaderState::Polling);
    }

    #[test]
    fn test_malformed_reading_is_discarded_without_reconnect() {
        // Arrange
        let mut source = gps_mock();
        source.expect_open().times(1).returning(|| Ok(()));
        source
            .expect_poll()
            .times(1)
            .returning(|| Err(SensorError::Malformed("1.0,2.0".into())));
        source.expect_close().never();
        let (mut reader, queue) = make_reader(source);
        reader.step();

        // Act
        reader.step();

        // Assert
        assert_eq!(reader.state(), ReaderState::Polling);
        assert_eq!(reader.reconnects(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sample_of_wrong_kind_is_discarded() {
        let mut source = gps_mock();
        source.expect_open().returning(|| Ok(()));
        source
            .expect_poll()
            .returning(|| Ok(Some(TelemetrySample::Orientation(Orientation::default()))));
        let (mut reader, queue) = make_reader(source);
        reader.step();

        reader.step();

        assert!(queue.is_empty());
        assert_eq!(reader.samples_emitted(), 0);
    }

    #[test]
    fn test_io_error_recovers_then_reacquires() {
        // Arrange
        let mut source = gps_mock();
        source.expect_open().times(2).returning(|| Ok(()));
        source.expect_poll().times(1).returning(|| {
            Err(SensorError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )))
        });
        source.expect_close().times(1).return_const(());
        let (mut reader, _) = make_reader(source);
        reader.step(); // ACQUIRING → POLLING

        // Act
        let after_error = reader.step(); // POLLING → RECOVERING
        let state_after_error = reader.state();
        let backoff = reader.step(); // RECOVERING → ACQUIRING
        reader.step(); // ACQUIRING → POLLING

        // Assert
        assert_eq!(after_error, Duration::ZERO);
        assert_eq!(state_after_error, ReaderState::Recovering);
        assert_eq!(backoff, timing().backoff);
        assert_eq!(reader.state(), ReaderState::Polling);
        assert_eq!(reader.reconnects(), 1);
    }

    #[test]
    fn test_shutdown_closes_open_source() {
        let mut source = gps_mock();
        source.expect_open().returning(|| Ok(()));
        source.expect_close().times(1).return_const(());
        let (mut reader, _) = make_reader(source);
        reader.step();

        reader.shutdown();

        assert_eq!(reader.state(), ReaderState::Shutdown);
    }

    #[test]
    fn test_shutdown_while_acquiring_does_not_close() {
        let mut source = gps_mock();
        source.expect_close().never();
        let (mut reader, _) = make_reader(source);

        reader.shutdown();

        assert_eq!(reader.state(), ReaderState::Shutdown);
    }

    #[test]
    fn test_run_exits_promptly_after_stop_during_long_backoff() {
        // Arrange – the source never opens and the retry delay is long
        let mut source = gps_mock();
        source
            .expect_open()
            .returning(|| Err(SensorError::Unavailable("absent".into())));
        let stop = StopSignal::new();
        let reader = SampleReader::new(
            source,
            Arc::new(OutboundQueue::unbounded()),
            ReaderTiming {
                retry_delay: Duration::from_secs(30),
                ..timing()
            },
            stop.clone(),
        );
        let handle = reader.spawn("test-reader".into()).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        // Act
        let started = Instant::now();
        stop.raise();
        let stats = handle.join().unwrap();

        // Assert
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(stats.samples_emitted, 0);
    }

    #[test]
    fn test_sleep_unless_stopped_returns_immediately_when_raised() {
        let stop = StopSignal::new();
        stop.raise();
        let started = Instant::now();

        sleep_unless_stopped(Duration::from_secs(10), &stop);

        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
