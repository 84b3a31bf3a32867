//! Sensor backends and the factory that builds them from configuration.
//!
//! Every backend implements [`SensorSource`]; the reader thread owns one and
//! drives it through open / poll / close.  Hardware access is blocking, which
//! is why readers run on dedicated OS threads instead of the Tokio runtime.
//!
//! | Kind                     | Produces      | Transport                     |
//! |--------------------------|---------------|-------------------------------|
//! | `gpsd`                   | GPS           | JSON lines over TCP (gpsd)    |
//! | `serial_orientation`     | Orientation   | text lines over a serial port |
//! | `i2c_orientation`        | Orientation   | Linux I2C device (Linux only) |
//! | `simulated_gps`          | GPS           | none                          |
//! | `simulated_orientation`  | Orientation   | none                          |

pub mod gpsd;
#[cfg(target_os = "linux")]
pub mod i2c_orientation;
pub mod mock;
pub mod serial_orientation;
pub mod simulated;

use crate::application::sample_reader::SensorSource;
use crate::infrastructure::network::SensorSpec;
use crate::infrastructure::storage::config::{ConfigError, SensorConfig, SensorKind};

/// Builds the source and reader timing for one configured sensor.
///
/// # Errors
///
/// [`ConfigError::Invalid`] when the entry cannot be satisfied on this
/// platform or has no serial device candidates.
pub fn build_sensor(config: &SensorConfig) -> Result<SensorSpec, ConfigError> {
    let source: Box<dyn SensorSource> = match config.kind {
        SensorKind::Gpsd => Box::new(gpsd::GpsdSource::new(
            config.gpsd_host.clone(),
            config.gpsd_port,
        )),
        SensorKind::SerialOrientation => {
            if config.device_candidates.is_empty() {
                return Err(ConfigError::Invalid(
                    "serial_orientation needs at least one device candidate".into(),
                ));
            }
            Box::new(serial_orientation::SerialOrientationSource::new(
                config.device_candidates.clone(),
                config.baud_rate,
            ))
        }
        SensorKind::I2cOrientation => i2c_source(config)?,
        SensorKind::SimulatedGps => Box::new(simulated::SimulatedSource::gps()),
        SensorKind::SimulatedOrientation => Box::new(simulated::SimulatedSource::orientation()),
    };
    Ok(SensorSpec::new(source, config.timing()))
}

/// Builds every configured sensor, failing on the first bad entry.
pub fn build_sensors(configs: &[SensorConfig]) -> Result<Vec<SensorSpec>, ConfigError> {
    configs.iter().map(build_sensor).collect()
}

#[cfg(target_os = "linux")]
fn i2c_source(config: &SensorConfig) -> Result<Box<dyn SensorSource>, ConfigError> {
    Ok(Box::new(i2c_orientation::I2cOrientationSource::new(
        config.i2c_bus,
        config.i2c_address,
    )))
}

#[cfg(not(target_os = "linux"))]
fn i2c_source(_config: &SensorConfig) -> Result<Box<dyn SensorSource>, ConfigError> {
    Err(ConfigError::Invalid(
        "i2c_orientation is only supported on Linux".into(),
    ))
}

#[cfg(test)]
mod tests {
    use telemetry_core::MessageType;

    use super::*;

    #[test]
    fn test_build_sensors_keeps_configured_order() {
        // Arrange
        let configs = vec![
            SensorConfig::new(SensorKind::SimulatedOrientation),
            SensorConfig::new(SensorKind::SimulatedGps),
        ];

        // Act
        let specs = build_sensors(&configs).unwrap();

        // Assert
        let kinds: Vec<MessageType> = specs.iter().map(|s| s.source.message_type()).collect();
        assert_eq!(kinds, vec![MessageType::Orientation, MessageType::Gps]);
    }

    #[test]
    fn test_build_sensor_applies_timing() {
        let mut config = SensorConfig::new(SensorKind::Gpsd);
        config.poll_period_ms = Some(750);
        let spec = build_sensor(&config).unwrap();
        assert_eq!(spec.timing.poll_period.as_millis(), 750);
        assert_eq!(spec.source.message_type(), MessageType::Gps);
    }

    #[test]
    fn test_serial_without_candidates_is_invalid() {
        let mut config = SensorConfig::new(SensorKind::SerialOrientation);
        config.device_candidates.clear();
        assert!(matches!(build_sensor(&config), Err(ConfigError::Invalid(_))));
    }
}
