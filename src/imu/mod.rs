//! Device driver layer.
//!
//! [`ImuSensor`] is the seam between the sampling scheduler and a concrete
//! device: register-level read and init for one bus-addressable sensor, with
//! no concurrency of its own. Every read is fallible and the caller isolates
//! failures per device.
//!
//! [`Mpu6050`] is the production driver over a caller-supplied [`I2cBus`];
//! [`MockImu`] is a deterministic in-memory sensor for tests and demos.

pub mod mock;
pub mod mpu6050;
pub mod registers;

pub use mock::{FailureMode, MockImu};
pub use mpu6050::Mpu6050;

use crate::config::{MAX_RATE_HZ, MIN_RATE_HZ};
use crate::error::DriverError;
use async_trait::async_trait;
use tracing::warn;

/// Minimal register-level bus access for one device address.
///
/// Implementations are provided by the host-integration layer (e.g. a Linux
/// I2C character device); the crate itself ships only the mock.
pub trait I2cBus: Send {
    /// Write one register.
    fn write_register(&mut self, address: u8, reg: u8, value: u8) -> Result<(), String>;
    /// Burst-read consecutive registers starting at `reg` into `buf`.
    fn read_registers(&mut self, address: u8, reg: u8, buf: &mut [u8]) -> Result<(), String>;
}

/// Device initialization parameters.
#[derive(Debug, Clone, Copy)]
pub struct ImuInitConfig {
    /// DLPF setting, 0..=6.
    pub dlpf: u8,
    /// Accelerometer full-scale range in g.
    pub accel_fs_g: u16,
    /// Gyroscope full-scale range in deg/s.
    pub gyro_fs_dps: u16,
    /// Requested sample rate in Hz (clamped into the valid range).
    pub requested_rate_hz: f64,
}

/// Outcome of a successful initialization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitOutcome {
    /// Sample-rate register divisor chosen.
    pub divisor: u8,
    /// Actual device rate in Hz implied by the divisor.
    pub actual_rate_hz: f64,
}

/// One bus-addressable inertial sensor.
#[async_trait]
pub trait ImuSensor: Send {
    /// Logical sensor identifier.
    fn sensor_id(&self) -> u8;

    /// Program filter, full-scale ranges and sample-rate divisor.
    async fn initialize(&mut self, cfg: &ImuInitConfig) -> Result<InitOutcome, DriverError>;

    /// Raw accelerometer triad (x, y, z counts).
    async fn read_accel(&mut self) -> Result<(i16, i16, i16), DriverError>;

    /// Raw gyroscope triad (x, y, z counts).
    async fn read_gyro(&mut self) -> Result<(i16, i16, i16), DriverError>;

    /// Die temperature in °C.
    async fn read_temperature(&mut self) -> Result<f64, DriverError>;
}

/// Clamp a requested rate into the supported range, logging when the clamp
/// actually changes the value. The clamped value is used rather than
/// rejecting the request; see DESIGN.md for the policy discussion.
pub fn clamp_rate_hz(sensor_id: u8, requested: f64) -> f64 {
    let clamped = requested.clamp(MIN_RATE_HZ, MAX_RATE_HZ);
    if (clamped - requested).abs() > f64::EPSILON {
        warn!(
            sensor_id,
            requested_hz = requested,
            clamped_hz = clamped,
            "requested sample rate outside supported range, clamped"
        );
    }
    clamped
}

/// Divisor and actual rate for a clamped request against a base clock.
pub fn divisor_for_rate(base_hz: f64, rate_hz: f64) -> (u8, f64) {
    let raw = (base_hz / rate_hz).round() - 1.0;
    let divisor = raw.clamp(0.0, 255.0) as u8;
    let actual = base_hz / f64::from(divisor as u16 + 1);
    (divisor, actual)
}

/// Device rate shared by a set of initialized sensors.
///
/// The stream handshake carries exactly one device rate. All sensors are
/// initialized from the same settings, so their divisors normally agree; if
/// they do not, the first sensor's rate is reported and the disagreement is
/// logged.
pub fn common_actual_rate(outcomes: &[InitOutcome], fallback_hz: f64) -> f64 {
    let Some(first) = outcomes.first() else {
        return fallback_hz;
    };
    if outcomes
        .iter()
        .any(|o| (o.actual_rate_hz - first.actual_rate_hz).abs() > 1e-9)
    {
        warn!(
            rates = ?outcomes.iter().map(|o| o.actual_rate_hz).collect::<Vec<_>>(),
            "sensors initialized at differing device rates, handshake reports the first"
        );
    }
    first.actual_rate_hz
}

/// Initialize every configured sensor, excluding the ones that fail.
///
/// The run fails outright only if no sensor initializes successfully.
pub async fn initialize_sensors(
    sensors: Vec<Box<dyn ImuSensor>>,
    cfg: &ImuInitConfig,
) -> crate::error::AppResult<Vec<(Box<dyn ImuSensor>, InitOutcome)>> {
    let mut ready = Vec::new();
    for mut sensor in sensors {
        let id = sensor.sensor_id();
        match sensor.initialize(cfg).await {
            Ok(outcome) => {
                tracing::info!(
                    sensor_id = id,
                    divisor = outcome.divisor,
                    actual_rate_hz = outcome.actual_rate_hz,
                    "sensor initialized"
                );
                ready.push((sensor, outcome));
            }
            Err(err) => {
                warn!(sensor_id = id, error = %err, "sensor excluded from run");
            }
        }
    }
    if ready.is_empty() {
        return Err(crate::error::DaqError::NoSensorsInitialized);
    }
    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_rate() {
        assert_eq!(clamp_rate_hz(1, 100.0), 100.0);
        assert_eq!(clamp_rate_hz(1, 0.5), MIN_RATE_HZ);
        assert_eq!(clamp_rate_hz(1, 5000.0), MAX_RATE_HZ);
    }

    #[test]
    fn test_common_actual_rate() {
        let outcomes = [
            InitOutcome {
                divisor: 9,
                actual_rate_hz: 100.0,
            },
            InitOutcome {
                divisor: 9,
                actual_rate_hz: 100.0,
            },
        ];
        assert_eq!(common_actual_rate(&outcomes, 50.0), 100.0);
        // Disagreement still reports the first rate.
        let mixed = [
            InitOutcome {
                divisor: 9,
                actual_rate_hz: 100.0,
            },
            InitOutcome {
                divisor: 4,
                actual_rate_hz: 200.0,
            },
        ];
        assert_eq!(common_actual_rate(&mixed, 50.0), 100.0);
        assert_eq!(common_actual_rate(&[], 50.0), 50.0);
    }

    #[test]
    fn test_divisor_for_rate() {
        let (div, actual) = divisor_for_rate(1000.0, 100.0);
        assert_eq!(div, 9);
        assert!((actual - 100.0).abs() < 1e-9);

        let (div, actual) = divisor_for_rate(1000.0, 4.0);
        assert_eq!(div, 249);
        assert!((actual - 4.0).abs() < 1e-9);

        // 8 kHz base cannot reach 4 Hz with a u8 divisor; saturates.
        let (div, actual) = divisor_for_rate(8000.0, 4.0);
        assert_eq!(div, 255);
        assert!((actual - 31.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_initialize_excludes_failing_sensor() {
        let cfg = ImuInitConfig {
            dlpf: 1,
            accel_fs_g: 2,
            gyro_fs_dps: 250,
            requested_rate_hz: 100.0,
        };
        let sensors: Vec<Box<dyn ImuSensor>> = vec![
            Box::new(MockImu::new(1).with_failure(FailureMode::Always)),
            Box::new(MockImu::new(2)),
        ];
        let ready = initialize_sensors(sensors, &cfg).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0.sensor_id(), 2);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_all_sensors_fail() {
        let cfg = ImuInitConfig {
            dlpf: 1,
            accel_fs_g: 2,
            gyro_fs_dps: 250,
            requested_rate_hz: 100.0,
        };
        let sensors: Vec<Box<dyn ImuSensor>> =
            vec![Box::new(MockImu::new(1).with_failure(FailureMode::Always))];
        assert!(matches!(
            initialize_sensors(sensors, &cfg).await,
            Err(crate::error::DaqError::NoSensorsInitialized)
        ));
    }
}
