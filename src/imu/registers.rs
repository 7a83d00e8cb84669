//! MPU-6050-family register map and pure raw-count scaling.
//!
//! Scaling from raw integer counts to physical units is stateless and lives
//! here rather than in the driver: the sampling scheduler applies it after a
//! successful read.

/// Power management 1: clock source, sleep bit.
pub const PWR_MGMT_1: u8 = 0x6B;
/// Sample-rate divider over the filtered base clock.
pub const SMPLRT_DIV: u8 = 0x19;
/// DLPF configuration.
pub const CONFIG: u8 = 0x1A;
/// Gyro full-scale select.
pub const GYRO_CONFIG: u8 = 0x1B;
/// Accel full-scale select.
pub const ACCEL_CONFIG: u8 = 0x1C;
/// First of six accel output registers (big-endian i16 x/y/z).
pub const ACCEL_XOUT_H: u8 = 0x3B;
/// First of two temperature output registers.
pub const TEMP_OUT_H: u8 = 0x41;
/// First of six gyro output registers.
pub const GYRO_XOUT_H: u8 = 0x43;
/// Identity register.
pub const WHO_AM_I: u8 = 0x75;

/// WHO_AM_I values accepted as the supported part family.
pub const KNOWN_DEVICE_IDS: [u8; 4] = [0x68, 0x70, 0x71, 0x73];

/// Standard gravity, m/s² per g.
pub const STANDARD_GRAVITY: f64 = 9.806_65;

/// Accelerometer sensitivity for a full-scale range in g.
///
/// Returns LSB per g. Ranges outside the part's table fall back to ±2 g.
pub fn accel_lsb_per_g(full_scale_g: u16) -> f64 {
    match full_scale_g {
        4 => 8192.0,
        8 => 4096.0,
        16 => 2048.0,
        _ => 16384.0,
    }
}

/// Gyroscope sensitivity for a full-scale range in deg/s.
///
/// Returns LSB per deg/s. Ranges outside the part's table fall back to
/// ±250 deg/s.
pub fn gyro_lsb_per_dps(full_scale_dps: u16) -> f64 {
    match full_scale_dps {
        500 => 65.5,
        1000 => 32.8,
        2000 => 16.4,
        _ => 131.0,
    }
}

/// Register field value for an accel full-scale range.
pub fn accel_fs_bits(full_scale_g: u16) -> u8 {
    match full_scale_g {
        4 => 0b01 << 3,
        8 => 0b10 << 3,
        16 => 0b11 << 3,
        _ => 0,
    }
}

/// Register field value for a gyro full-scale range.
pub fn gyro_fs_bits(full_scale_dps: u16) -> u8 {
    match full_scale_dps {
        500 => 0b01 << 3,
        1000 => 0b10 << 3,
        2000 => 0b11 << 3,
        _ => 0,
    }
}

/// Raw accel counts to m/s².
pub fn accel_counts_to_ms2(raw: i16, full_scale_g: u16) -> f64 {
    f64::from(raw) / accel_lsb_per_g(full_scale_g) * STANDARD_GRAVITY
}

/// Raw gyro counts to deg/s.
pub fn gyro_counts_to_dps(raw: i16, full_scale_dps: u16) -> f64 {
    f64::from(raw) / gyro_lsb_per_dps(full_scale_dps)
}

/// Raw temperature counts to °C (datasheet formula).
pub fn temp_counts_to_c(raw: i16) -> f64 {
    f64::from(raw) / 340.0 + 36.53
}

/// Internal sample clock in Hz for a DLPF setting.
///
/// The filter jointly sets noise bandwidth and the divisor base: 8 kHz with
/// the filter off, 1 kHz otherwise.
pub fn base_rate_hz(dlpf: u8) -> f64 {
    if dlpf == 0 {
        8000.0
    } else {
        1000.0
    }
}

/// Accelerometer noise bandwidth in Hz for a DLPF setting, for metadata.
pub fn dlpf_bandwidth_hz(dlpf: u8) -> f64 {
    match dlpf {
        0 => 260.0,
        1 => 184.0,
        2 => 94.0,
        3 => 44.0,
        4 => 21.0,
        5 => 10.0,
        _ => 5.0,
    }
}
