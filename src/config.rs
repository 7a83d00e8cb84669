//! Configuration management.
//!
//! Settings are loaded with the `config` crate from an optional TOML file and
//! `IMU_DAQ_`-prefixed environment variables, then semantically validated.
//! Parsing errors surface as [`DaqError::Config`], validation errors as
//! [`DaqError::Configuration`].

use crate::data::{Channel, ChannelMode};
use crate::error::{AppResult, DaqError};
use config::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Requested sample rates are clamped into this range, matching the
/// register-divisor limits of the supported devices. Both the driver (for the
/// divisor) and the scheduler (for loop pacing) apply the clamp; one that
/// changes the requested value is logged at `warn`.
pub const MIN_RATE_HZ: f64 = 4.0;
/// Upper bound of the valid sample-rate range.
pub const MAX_RATE_HZ: f64 = 1000.0;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log filter directive (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Sampling loop and device configuration.
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    /// Durable writer configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Streaming/decimation configuration.
    #[serde(default)]
    pub stream: StreamSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One bus-addressable sensor.
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    /// Logical sensor identifier, small positive integer.
    pub id: u8,
    /// Bus device name, informational only (e.g. "i2c-1").
    #[serde(default = "default_bus")]
    pub bus: String,
    /// 7-bit bus address.
    #[serde(default = "default_address")]
    pub address: u8,
}

fn default_bus() -> String {
    "i2c-1".to_string()
}

fn default_address() -> u8 {
    0x68
}

/// Sampling loop and device settings.
#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionSettings {
    /// Target sample rate in Hz.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Channel subset recorded for the session.
    #[serde(default)]
    pub channel_mode: ChannelMode,
    /// Enabled sensors.
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
    /// Digital low-pass filter setting, 0..=6.
    #[serde(default = "default_dlpf")]
    pub dlpf: u8,
    /// Accelerometer full-scale range in g (2, 4, 8 or 16).
    #[serde(default = "default_accel_fs")]
    pub accel_fs_g: u16,
    /// Gyroscope full-scale range in deg/s (250, 500, 1000 or 2000).
    #[serde(default = "default_gyro_fs")]
    pub gyro_fs_dps: u16,
    /// Stop after this many cycles, if set.
    #[serde(default)]
    pub sample_limit: Option<u64>,
    /// Stop after this wall duration, if set.
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
}

fn default_rate_hz() -> f64 {
    100.0
}

fn default_sensors() -> Vec<SensorConfig> {
    vec![SensorConfig {
        id: 1,
        bus: default_bus(),
        address: default_address(),
    }]
}

fn default_dlpf() -> u8 {
    1
}

fn default_accel_fs() -> u16 {
    2
}

fn default_gyro_fs() -> u16 {
    250
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            channel_mode: ChannelMode::default(),
            sensors: default_sensors(),
            dlpf: default_dlpf(),
            accel_fs_g: default_accel_fs(),
            gyro_fs_dps: default_gyro_fs(),
            sample_limit: None,
            duration: None,
        }
    }
}

/// Durable output format per session.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Row-oriented tabular output with a header line.
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl OutputFormat {
    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

/// Durable writer settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Root directory; each session creates a timestamped subdirectory.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Row encoding.
    #[serde(default = "default_format")]
    pub format: OutputFormat,
    /// Flush after this many buffered rows.
    #[serde(default = "default_flush_rows")]
    pub flush_rows: usize,
    /// Flush after this much time since the last flush.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    /// fsync on every flush. Off by default for throughput; the final flush
    /// on a clean stop always syncs regardless.
    #[serde(default)]
    pub fsync_each_flush: bool,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_format() -> OutputFormat {
    OutputFormat::Csv
}

fn default_flush_rows() -> usize {
    50
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            format: default_format(),
            flush_rows: default_flush_rows(),
            flush_interval: default_flush_interval(),
            fsync_each_flush: false,
        }
    }
}

/// Streaming settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    /// Whether the stream encoder is active.
    #[serde(default = "default_stream_enabled")]
    pub enabled: bool,
    /// Emit every Nth successful sample per sensor.
    #[serde(default = "default_decimation")]
    pub decimation: u32,
    /// Streamed channel subset; defaults to the recorded channel mode.
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
}

fn default_stream_enabled() -> bool {
    true
}

fn default_decimation() -> u32 {
    4
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            enabled: default_stream_enabled(),
            decimation: default_decimation(),
            channels: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            acquisition: AcquisitionSettings::default(),
            storage: StorageSettings::default(),
            stream: StreamSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file plus environment overrides
    /// (`IMU_DAQ_STORAGE__FLUSH_ROWS=10` style).
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix("IMU_DAQ").separator("__"))
            .build()?;
        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation, run after parsing.
    pub fn validate(&self) -> AppResult<()> {
        let acq = &self.acquisition;
        if !acq.rate_hz.is_finite() || acq.rate_hz <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "rate_hz must be a positive finite number, got {}",
                acq.rate_hz
            )));
        }
        if acq.sensors.is_empty() {
            return Err(DaqError::Configuration(
                "at least one sensor must be configured".to_string(),
            ));
        }
        let mut ids: Vec<u8> = acq.sensors.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != acq.sensors.len() {
            return Err(DaqError::Configuration(
                "sensor ids must be unique".to_string(),
            ));
        }
        if acq.sensors.iter().any(|s| s.id == 0) {
            return Err(DaqError::Configuration(
                "sensor ids must be positive".to_string(),
            ));
        }
        if acq.dlpf > 6 {
            return Err(DaqError::Configuration(format!(
                "dlpf must be in 0..=6, got {}",
                acq.dlpf
            )));
        }
        if !matches!(acq.accel_fs_g, 2 | 4 | 8 | 16) {
            return Err(DaqError::Configuration(format!(
                "accel_fs_g must be one of 2, 4, 8, 16, got {}",
                acq.accel_fs_g
            )));
        }
        if !matches!(acq.gyro_fs_dps, 250 | 500 | 1000 | 2000) {
            return Err(DaqError::Configuration(format!(
                "gyro_fs_dps must be one of 250, 500, 1000, 2000, got {}",
                acq.gyro_fs_dps
            )));
        }
        if acq.channel_mode.channels().is_empty() {
            return Err(DaqError::Configuration(
                "channel_mode selects no channels".to_string(),
            ));
        }
        if self.storage.flush_rows == 0 {
            return Err(DaqError::Configuration(
                "storage.flush_rows must be at least 1".to_string(),
            ));
        }
        if self.storage.flush_interval.is_zero() {
            return Err(DaqError::Configuration(
                "storage.flush_interval must be non-zero".to_string(),
            ));
        }
        if self.stream.decimation == 0 {
            return Err(DaqError::Configuration(
                "stream.decimation must be at least 1".to_string(),
            ));
        }
        if let Some(channels) = &self.stream.channels {
            if channels.is_empty() {
                return Err(DaqError::Configuration(
                    "stream.channels must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Channels actually placed on the wire: the configured stream subset,
    /// or the recorded channel mode when none is configured.
    pub fn stream_channels(&self) -> Vec<Channel> {
        match &self.stream.channels {
            Some(list) => ChannelMode::Custom(list.clone()).channels(),
            None => self.acquisition.channel_mode.channels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imu_daq.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
log_level = "debug"

[acquisition]
rate_hz = 200.0
channel_mode = "all"
sensors = [{{ id = 1, address = 0x68 }}, {{ id = 2, address = 0x69 }}]
duration = "2s"

[storage]
format = "jsonl"
flush_rows = 10
flush_interval = "250ms"

[stream]
decimation = 2
channels = ["ax", "gz"]
"#
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.acquisition.rate_hz, 200.0);
        assert_eq!(settings.acquisition.sensors.len(), 2);
        assert_eq!(
            settings.acquisition.duration,
            Some(Duration::from_secs(2))
        );
        assert_eq!(settings.storage.format, OutputFormat::Jsonl);
        assert_eq!(settings.storage.flush_interval, Duration::from_millis(250));
        assert_eq!(settings.stream.decimation, 2);
        assert_eq!(
            settings.stream_channels(),
            vec![Channel::Ax, Channel::Gz]
        );
    }

    #[test]
    fn test_duplicate_sensor_ids_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.sensors = vec![
            SensorConfig {
                id: 1,
                bus: "i2c-1".into(),
                address: 0x68,
            },
            SensorConfig {
                id: 1,
                bus: "i2c-1".into(),
                address: 0x69,
            },
        ];
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_decimation_rejected() {
        let mut settings = Settings::default();
        settings.stream.decimation = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_stream_channels_default_to_mode() {
        let settings = Settings::default();
        assert_eq!(
            settings.stream_channels(),
            settings.acquisition.channel_mode.channels()
        );
    }
}
