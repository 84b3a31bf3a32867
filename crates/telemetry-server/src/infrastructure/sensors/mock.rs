//! Scripted sensor source for tests.
//!
//! [`ScriptedSource`] replays a fixed sequence of `open` and `poll` outcomes
//! so reader and server behaviour can be exercised without hardware.  Once
//! the poll script is exhausted every further poll is empty.
//!
//! The source is moved into a reader thread, so call counts are exposed
//! through a shared [`ScriptProbe`] that the test keeps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use telemetry_core::{MessageType, TelemetrySample};

use crate::application::sample_reader::{SensorError, SensorSource};

/// One scripted poll outcome.
#[derive(Debug, Clone)]
pub enum ScriptedPoll {
    Sample(TelemetrySample),
    Empty,
    /// Reported as [`SensorError::Io`].
    IoError,
    /// Reported as [`SensorError::Malformed`].
    Malformed,
}

/// Shared call counters for a [`ScriptedSource`].
#[derive(Debug, Default)]
pub struct ScriptProbe {
    opens: AtomicUsize,
    polls: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptProbe {
    /// Successful and failed `open` calls.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScriptedSource {
    message_type: MessageType,
    failing_opens: usize,
    polls: VecDeque<ScriptedPoll>,
    probe: Arc<ScriptProbe>,
}

impl ScriptedSource {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            failing_opens: 0,
            polls: VecDeque::new(),
            probe: Arc::new(ScriptProbe::default()),
        }
    }

    /// The next `count` calls to `open` fail with `Unavailable`.
    pub fn fail_opens(mut self, count: usize) -> Self {
        self.failing_opens = count;
        self
    }

    /// Appends one poll outcome to the script.
    pub fn then(mut self, poll: ScriptedPoll) -> Self {
        self.polls.push_back(poll);
        self
    }

    /// Appends `count` copies of `poll`.
    pub fn then_repeat(mut self, poll: ScriptedPoll, count: usize) -> Self {
        for _ in 0..count {
            self.polls.push_back(poll.clone());
        }
        self
    }

    pub fn probe(&self) -> Arc<ScriptProbe> {
        Arc::clone(&self.probe)
    }
}

impl SensorSource for ScriptedSource {
    fn message_type(&self) -> MessageType {
        self.message_type
    }

    fn open(&mut self) -> Result<(), SensorError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(SensorError::Unavailable("scripted open failure".into()));
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError> {
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
        match self.polls.pop_front() {
            Some(ScriptedPoll::Sample(sample)) => Ok(Some(sample)),
            Some(ScriptedPoll::Empty) | None => Ok(None),
            Some(ScriptedPoll::IoError) => Err(SensorError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted I/O failure",
            ))),
            Some(ScriptedPoll::Malformed) => {
                Err(SensorError::Malformed("scripted malformed reading".into()))
            }
        }
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use telemetry_core::Orientation;

    use super::*;

    #[test]
    fn test_script_replays_in_order_then_goes_quiet() {
        // Arrange
        let sample = TelemetrySample::Orientation(Orientation::default());
        let mut source = ScriptedSource::new(MessageType::Orientation)
            .fail_opens(1)
            .then(ScriptedPoll::Sample(sample.clone()))
            .then(ScriptedPoll::IoError);
        let probe = source.probe();

        // Act / Assert
        assert!(source.open().is_err());
        assert!(source.open().is_ok());
        assert_eq!(source.poll().unwrap(), Some(sample));
        assert!(matches!(source.poll(), Err(SensorError::Io(_))));
        assert_eq!(source.poll().unwrap(), None);
        assert_eq!(probe.opens(), 2);
        assert_eq!(probe.polls(), 3);
    }
}
