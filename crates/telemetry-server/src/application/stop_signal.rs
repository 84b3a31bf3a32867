//! Cooperative stop flag.
//!
//! Every long-running task (sample reader thread, broadcaster, acceptor) owns
//! one [`StopSignal`] and checks it once per loop iteration.  The server keeps
//! a clone of each and raises them all during shutdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A clonable, thread-safe "please stop" flag.
///
/// Clones share the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder of this signal to stop.  Idempotent.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_signal_is_not_raised() {
        assert!(!StopSignal::new().is_raised());
    }

    #[test]
    fn test_raise_is_visible_through_clone() {
        // Arrange
        let signal = StopSignal::new();
        let observer = signal.clone();

        // Act
        signal.raise();

        // Assert
        assert!(observer.is_raised());
    }
}
