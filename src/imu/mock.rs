//! Deterministic mock sensor for tests and transport-free demos.
//!
//! Generates smooth waveforms with a little seeded noise, and supports
//! scripted failure injection and per-cycle read delays so scheduler error
//! isolation and overrun accounting can be exercised without hardware.

use super::registers::{accel_lsb_per_g, base_rate_hz, gyro_lsb_per_dps};
use super::{clamp_rate_hz, divisor_for_rate, ImuInitConfig, ImuSensor, InitOutcome};
use crate::error::{DriverError, DriverErrorKind};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Scripted failure behavior for a mock sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Never fail.
    None,
    /// Fail initialization and every read.
    Always,
    /// Fail every Nth read attempt (1-based).
    EveryNth(u64),
    /// Fail every read attempt after the first N successes.
    AfterN(u64),
}

/// In-memory sensor producing plausible inertial waveforms.
pub struct MockImu {
    sensor_id: u8,
    failure: FailureMode,
    reads: u64,
    cycles: u64,
    rng: StdRng,
    accel_fs_g: u16,
    gyro_fs_dps: u16,
    /// Extra read latency injected every `delay_every`-th accel read.
    read_delay: Option<Duration>,
    delay_every: u64,
}

impl MockImu {
    /// New mock with a seed derived from the sensor id, so runs are
    /// reproducible but sensors differ.
    pub fn new(sensor_id: u8) -> Self {
        Self {
            sensor_id,
            failure: FailureMode::None,
            reads: 0,
            cycles: 0,
            rng: StdRng::seed_from_u64(0xDA0 + u64::from(sensor_id)),
            accel_fs_g: 2,
            gyro_fs_dps: 250,
            read_delay: None,
            delay_every: 0,
        }
    }

    /// Set the failure script.
    pub fn with_failure(mut self, failure: FailureMode) -> Self {
        self.failure = failure;
        self
    }

    /// Inject `delay` into every `every`-th accel read.
    pub fn with_read_delay(mut self, delay: Duration, every: u64) -> Self {
        self.read_delay = Some(delay);
        self.delay_every = every.max(1);
        self
    }

    fn check_failure(&mut self) -> Result<(), DriverError> {
        self.reads += 1;
        let fail = match self.failure {
            FailureMode::None => false,
            FailureMode::Always => true,
            FailureMode::EveryNth(n) => n > 0 && self.reads % n == 0,
            FailureMode::AfterN(n) => self.reads > n,
        };
        if fail {
            Err(DriverError::bus(self.sensor_id, "simulated bus error"))
        } else {
            Ok(())
        }
    }

    fn phase(&self) -> f64 {
        self.cycles as f64 * 0.01
    }

    fn noise(&mut self, scale: f64) -> f64 {
        self.rng.gen_range(-scale..scale)
    }
}

#[async_trait]
impl ImuSensor for MockImu {
    fn sensor_id(&self) -> u8 {
        self.sensor_id
    }

    async fn initialize(&mut self, cfg: &ImuInitConfig) -> Result<InitOutcome, DriverError> {
        if self.failure == FailureMode::Always {
            return Err(DriverError::new(
                self.sensor_id,
                DriverErrorKind::Initialization,
                "simulated init failure",
            ));
        }
        self.accel_fs_g = cfg.accel_fs_g;
        self.gyro_fs_dps = cfg.gyro_fs_dps;
        let base = base_rate_hz(cfg.dlpf);
        let rate = clamp_rate_hz(self.sensor_id, cfg.requested_rate_hz);
        let (divisor, actual_rate_hz) = divisor_for_rate(base, rate);
        Ok(InitOutcome {
            divisor,
            actual_rate_hz,
        })
    }

    async fn read_accel(&mut self) -> Result<(i16, i16, i16), DriverError> {
        self.cycles += 1;
        if let Some(delay) = self.read_delay {
            if self.cycles % self.delay_every == 0 {
                tokio::time::sleep(delay).await;
            }
        }
        self.check_failure()?;
        let lsb = accel_lsb_per_g(self.accel_fs_g);
        let p = self.phase();
        let x = (0.3 * p.sin() + self.noise(0.002)) * lsb;
        let y = (0.3 * (p * 1.3).cos() + self.noise(0.002)) * lsb;
        let z = (1.0 + self.noise(0.002)) * lsb;
        Ok((x as i16, y as i16, z as i16))
    }

    async fn read_gyro(&mut self) -> Result<(i16, i16, i16), DriverError> {
        self.check_failure()?;
        let lsb = gyro_lsb_per_dps(self.gyro_fs_dps);
        let p = self.phase();
        let x = (5.0 * (p * 0.7).sin() + self.noise(0.05)) * lsb;
        let y = (5.0 * (p * 0.9).cos() + self.noise(0.05)) * lsb;
        let z = (2.0 * p.sin() + self.noise(0.05)) * lsb;
        Ok((x as i16, y as i16, z as i16))
    }

    async fn read_temperature(&mut self) -> Result<f64, DriverError> {
        self.check_failure()?;
        Ok(36.5 + self.noise(0.05))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_cfg() -> ImuInitConfig {
        ImuInitConfig {
            dlpf: 1,
            accel_fs_g: 2,
            gyro_fs_dps: 250,
            requested_rate_hz: 100.0,
        }
    }

    #[tokio::test]
    async fn test_mock_initializes_with_divisor() {
        let mut imu = MockImu::new(1);
        let outcome = imu.initialize(&init_cfg()).await.unwrap();
        assert_eq!(outcome.divisor, 9);
        assert!((outcome.actual_rate_hz - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_every_nth_failure() {
        let mut imu = MockImu::new(1).with_failure(FailureMode::EveryNth(3));
        imu.initialize(&init_cfg()).await.unwrap();
        let mut failures = 0;
        for _ in 0..9 {
            if imu.read_gyro().await.is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 3);
    }

    #[tokio::test]
    async fn test_always_failure_hits_reads() {
        let mut imu = MockImu::new(1).with_failure(FailureMode::Always);
        assert!(imu.read_accel().await.is_err());
        assert!(imu.read_temperature().await.is_err());
    }

    #[tokio::test]
    async fn test_accel_is_roughly_one_g_on_z() {
        let mut imu = MockImu::new(1);
        imu.initialize(&init_cfg()).await.unwrap();
        let (_, _, z) = imu.read_accel().await.unwrap();
        let g = f64::from(z) / accel_lsb_per_g(2);
        assert!((g - 1.0).abs() < 0.05, "z accel {} g", g);
    }
}
