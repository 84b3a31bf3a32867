//! Latest-value tracking for received telemetry.
//!
//! GPS receivers often report partial fixes (no altitude without a 3-D lock,
//! no error estimates on some chipsets).  The tracker merges each new fix
//! into the last known one so a field that was reported once stays visible
//! until the receiver reports a new value for it.  Orientation readings are
//! always complete and simply replace the previous one.

use telemetry_core::{GpsFix, MessageType, Orientation, TelemetrySample};

/// Latest known GPS fix and orientation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryTracker {
    gps: Option<GpsFix>,
    orientation: Option<Orientation>,
    gps_updates: u64,
    orientation_updates: u64,
}

impl TelemetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the tracked state and returns its kind.
    pub fn apply(&mut self, sample: TelemetrySample) -> MessageType {
        match sample {
            TelemetrySample::Gps(fix) => {
                match self.gps.as_mut() {
                    Some(current) => current.merge_from(&fix),
                    None => self.gps = Some(fix),
                }
                self.gps_updates += 1;
                MessageType::Gps
            }
            TelemetrySample::Orientation(o) => {
                self.orientation = Some(o);
                self.orientation_updates += 1;
                MessageType::Orientation
            }
        }
    }

    /// Merged GPS state, or `None` before the first fix.
    pub fn gps(&self) -> Option<&GpsFix> {
        self.gps.as_ref()
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    /// Number of samples of `kind` applied so far.
    pub fn updates(&self, kind: MessageType) -> u64 {
        match kind {
            MessageType::Gps => self.gps_updates,
            MessageType::Orientation => self.orientation_updates,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_empty() {
        let tracker = TelemetryTracker::new();
        assert!(tracker.gps().is_none());
        assert!(tracker.orientation().is_none());
        assert_eq!(tracker.updates(MessageType::Gps), 0);
    }

    #[test]
    fn test_partial_fix_keeps_previously_reported_fields() {
        // Arrange
        let mut tracker = TelemetryTracker::new();
        tracker.apply(TelemetrySample::Gps(GpsFix {
            lat: Some(45.0),
            lon: Some(-122.0),
            alt: Some(30.0),
            ..GpsFix::default()
        }));

        // Act
        tracker.apply(TelemetrySample::Gps(GpsFix {
            lat: Some(45.1),
            ..GpsFix::default()
        }));

        // Assert
        let gps = tracker.gps().unwrap();
        assert_eq!(gps.lat, Some(45.1));
        assert_eq!(gps.lon, Some(-122.0));
        assert_eq!(gps.alt, Some(30.0));
        assert_eq!(tracker.updates(MessageType::Gps), 2);
    }

    #[test]
    fn test_orientation_replaces_previous_reading() {
        // Arrange
        let mut tracker = TelemetryTracker::new();
        let first = Orientation { roll: 1.0, pitch: 2.0, yaw: 3.0 };
        let second = Orientation { roll: -1.0, pitch: 0.0, yaw: 359.0 };

        // Act
        tracker.apply(first.into());
        let kind = tracker.apply(second.into());

        // Assert
        assert_eq!(kind, MessageType::Orientation);
        assert_eq!(tracker.orientation(), Some(second));
        assert_eq!(tracker.updates(MessageType::Orientation), 2);
        assert!(tracker.gps().is_none());
    }
}
