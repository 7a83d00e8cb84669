//! Register-level driver for MPU-6050-family parts.

use super::registers::{
    accel_fs_bits, base_rate_hz, gyro_fs_bits, temp_counts_to_c, ACCEL_CONFIG, ACCEL_XOUT_H,
    CONFIG, GYRO_CONFIG, GYRO_XOUT_H, KNOWN_DEVICE_IDS, PWR_MGMT_1, SMPLRT_DIV, TEMP_OUT_H,
    WHO_AM_I,
};
use super::{clamp_rate_hz, divisor_for_rate, I2cBus, ImuInitConfig, ImuSensor, InitOutcome};
use crate::error::{DriverError, DriverErrorKind};
use async_trait::async_trait;

/// One MPU-6050-family sensor behind an [`I2cBus`].
///
/// Holds no concurrency of its own; bus transactions are short blocking
/// register accesses.
pub struct Mpu6050<B: I2cBus> {
    bus: B,
    sensor_id: u8,
    address: u8,
}

impl<B: I2cBus> Mpu6050<B> {
    /// Wrap a bus handle for the sensor at `address`.
    pub fn new(sensor_id: u8, address: u8, bus: B) -> Self {
        Self {
            bus,
            sensor_id,
            address,
        }
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<(), DriverError> {
        self.bus
            .write_register(self.address, reg, value)
            .map_err(|msg| DriverError::bus(self.sensor_id, msg))
    }

    fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), DriverError> {
        self.bus
            .read_registers(self.address, reg, buf)
            .map_err(|msg| DriverError::bus(self.sensor_id, msg))
    }

    fn read_triad(&mut self, reg: u8) -> Result<(i16, i16, i16), DriverError> {
        let mut buf = [0u8; 6];
        self.read(reg, &mut buf)?;
        Ok((
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ))
    }
}

#[async_trait]
impl<B: I2cBus> ImuSensor for Mpu6050<B> {
    fn sensor_id(&self) -> u8 {
        self.sensor_id
    }

    async fn initialize(&mut self, cfg: &ImuInitConfig) -> Result<InitOutcome, DriverError> {
        if cfg.dlpf > 6 {
            return Err(DriverError::new(
                self.sensor_id,
                DriverErrorKind::InvalidParameter,
                format!("dlpf {} out of range 0..=6", cfg.dlpf),
            ));
        }

        let mut id = [0u8; 1];
        self.read(WHO_AM_I, &mut id)?;
        if !KNOWN_DEVICE_IDS.contains(&id[0]) {
            return Err(DriverError::new(
                self.sensor_id,
                DriverErrorKind::NotPresent,
                format!("unexpected WHO_AM_I {:#04x}", id[0]),
            ));
        }

        // Wake from sleep, PLL off the X gyro for clock stability.
        self.write(PWR_MGMT_1, 0x01)?;
        self.write(CONFIG, cfg.dlpf)?;
        self.write(GYRO_CONFIG, gyro_fs_bits(cfg.gyro_fs_dps))?;
        self.write(ACCEL_CONFIG, accel_fs_bits(cfg.accel_fs_g))?;

        let base = base_rate_hz(cfg.dlpf);
        let rate = clamp_rate_hz(self.sensor_id, cfg.requested_rate_hz);
        let (divisor, actual_rate_hz) = divisor_for_rate(base, rate);
        self.write(SMPLRT_DIV, divisor)?;

        Ok(InitOutcome {
            divisor,
            actual_rate_hz,
        })
    }

    async fn read_accel(&mut self) -> Result<(i16, i16, i16), DriverError> {
        self.read_triad(ACCEL_XOUT_H)
    }

    async fn read_gyro(&mut self) -> Result<(i16, i16, i16), DriverError> {
        self.read_triad(GYRO_XOUT_H)
    }

    async fn read_temperature(&mut self) -> Result<f64, DriverError> {
        let mut buf = [0u8; 2];
        self.read(TEMP_OUT_H, &mut buf)?;
        Ok(temp_counts_to_c(i16::from_be_bytes(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory register file standing in for a real bus.
    struct FakeBus {
        regs: HashMap<u8, u8>,
        fail_reads: bool,
    }

    impl FakeBus {
        fn new() -> Self {
            let mut regs = HashMap::new();
            regs.insert(WHO_AM_I, 0x68);
            // ax = 0x4000 (1 g at ±2 g), rest zero.
            regs.insert(ACCEL_XOUT_H, 0x40);
            Self {
                regs,
                fail_reads: false,
            }
        }
    }

    impl I2cBus for FakeBus {
        fn write_register(&mut self, _address: u8, reg: u8, value: u8) -> Result<(), String> {
            self.regs.insert(reg, value);
            Ok(())
        }

        fn read_registers(
            &mut self,
            _address: u8,
            reg: u8,
            buf: &mut [u8],
        ) -> Result<(), String> {
            if self.fail_reads {
                return Err("bus NACK".to_string());
            }
            for (i, out) in buf.iter_mut().enumerate() {
                *out = *self.regs.get(&(reg + i as u8)).unwrap_or(&0);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_programs_registers() {
        let mut imu = Mpu6050::new(1, 0x68, FakeBus::new());
        let cfg = ImuInitConfig {
            dlpf: 1,
            accel_fs_g: 8,
            gyro_fs_dps: 500,
            requested_rate_hz: 100.0,
        };
        let outcome = imu.initialize(&cfg).await.unwrap();
        assert_eq!(outcome.divisor, 9);
        assert!((outcome.actual_rate_hz - 100.0).abs() < 1e-9);
        assert_eq!(imu.bus.regs[&PWR_MGMT_1], 0x01);
        assert_eq!(imu.bus.regs[&CONFIG], 1);
        assert_eq!(imu.bus.regs[&GYRO_CONFIG], 0x08);
        assert_eq!(imu.bus.regs[&ACCEL_CONFIG], 0x10);
        assert_eq!(imu.bus.regs[&SMPLRT_DIV], 9);
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let mut bus = FakeBus::new();
        bus.regs.insert(WHO_AM_I, 0x12);
        let mut imu = Mpu6050::new(1, 0x68, bus);
        let cfg = ImuInitConfig {
            dlpf: 1,
            accel_fs_g: 2,
            gyro_fs_dps: 250,
            requested_rate_hz: 100.0,
        };
        let err = imu.initialize(&cfg).await.unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::NotPresent);
    }

    #[tokio::test]
    async fn test_read_accel_decodes_big_endian() {
        let mut imu = Mpu6050::new(1, 0x68, FakeBus::new());
        let (x, y, z) = imu.read_accel().await.unwrap();
        assert_eq!(x, 0x4000);
        assert_eq!(y, 0);
        assert_eq!(z, 0);
    }

    #[tokio::test]
    async fn test_bus_failure_maps_to_driver_error() {
        let mut bus = FakeBus::new();
        bus.fail_reads = true;
        let mut imu = Mpu6050::new(7, 0x68, bus);
        let err = imu.read_gyro().await.unwrap_err();
        assert_eq!(err.sensor_id, 7);
        assert_eq!(err.kind, DriverErrorKind::Bus);
    }
}
