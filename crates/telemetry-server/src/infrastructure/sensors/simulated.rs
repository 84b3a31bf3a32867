//! Synthetic sensors for running the server without hardware.
//!
//! The values are deterministic functions of a tick counter, so two runs
//! produce the same stream:
//!
//! - GPS walks a small circle (about 100 m radius) around a base position.
//! - Orientation sweeps yaw through a full turn while roll and pitch rock
//!   gently.

use telemetry_core::{GpsFix, MessageType, Orientation, TelemetrySample};

use crate::application::sample_reader::{SensorError, SensorSource};

/// Base position of the simulated GPS track (Portland, Oregon).
const BASE_LAT: f64 = 45.5152;
const BASE_LON: f64 = -122.6784;
/// Circle radius in degrees of latitude (~100 m).
const RADIUS_DEG: f64 = 0.0009;
/// Ticks per full lap or full turn.
const PERIOD_TICKS: u64 = 360;

#[derive(Debug)]
pub struct SimulatedSource {
    message_type: MessageType,
    tick: u64,
}

impl SimulatedSource {
    pub fn gps() -> Self {
        Self {
            message_type: MessageType::Gps,
            tick: 0,
        }
    }

    pub fn orientation() -> Self {
        Self {
            message_type: MessageType::Orientation,
            tick: 0,
        }
    }

    fn angle(&self) -> f64 {
        ((self.tick % PERIOD_TICKS) as f64).to_radians()
    }

    fn gps_fix(&self) -> GpsFix {
        let a = self.angle();
        GpsFix {
            time: None,
            lat: Some(BASE_LAT + RADIUS_DEG * a.sin()),
            lon: Some(BASE_LON + RADIUS_DEG * a.cos() / BASE_LAT.to_radians().cos()),
            alt: Some(15.0),
            speed: Some(1.5),
            climb: Some(0.0),
            epx: Some(3.0),
            epy: Some(3.0),
            epv: Some(5.0),
        }
    }

    fn orientation_reading(&self) -> Orientation {
        let a = self.angle();
        Orientation {
            roll: 5.0 * (a * 4.0).sin(),
            pitch: 3.0 * (a * 2.0).cos(),
            yaw: (self.tick % PERIOD_TICKS) as f64,
        }
    }
}

impl SensorSource for SimulatedSource {
    fn message_type(&self) -> MessageType {
        self.message_type
    }

    fn open(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TelemetrySample>, SensorError> {
        let sample = match self.message_type {
            MessageType::Gps => TelemetrySample::Gps(self.gps_fix()),
            MessageType::Orientation => TelemetrySample::Orientation(self.orientation_reading()),
        };
        self.tick = self.tick.wrapping_add(1);
        Ok(Some(sample))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_gps_stays_near_base() {
        let mut source = SimulatedSource::gps();
        for _ in 0..PERIOD_TICKS {
            let Some(TelemetrySample::Gps(fix)) = source.poll().unwrap() else {
                panic!("expected GPS sample");
            };
            let lat = fix.lat.unwrap();
            assert!((lat - BASE_LAT).abs() <= RADIUS_DEG + 1e-9);
        }
    }

    #[test]
    fn test_simulated_orientation_yaw_advances_one_degree_per_poll() {
        let mut source = SimulatedSource::orientation();
        let yaws: Vec<f64> = (0..3)
            .map(|_| match source.poll().unwrap() {
                Some(TelemetrySample::Orientation(o)) => o.yaw,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(yaws, vec![0.0, 1.0, 2.0]);
    }
}
