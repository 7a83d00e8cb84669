//! Per-sensor companion metadata, written once at writer start.

use crate::data::ChannelMode;
use crate::error::{AppResult, DaqError};
use crate::imu::registers::dlpf_bandwidth_hz;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Session parameters and device-measured rate for one sensor's output.
///
/// Serialized as pretty JSON next to the data file; never updated after the
/// writer starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorMetadata {
    /// Session start wall-clock time.
    pub started_at: DateTime<Utc>,
    /// Host the producer ran on.
    pub host: String,
    /// Logical sensor identifier.
    pub sensor_id: u8,
    /// Bus device name.
    pub bus: String,
    /// 7-bit bus address.
    pub address: u8,
    /// Rate asked of the device, Hz.
    pub requested_rate_hz: f64,
    /// Rate implied by the chosen divisor, Hz.
    pub actual_rate_hz: f64,
    /// Sample-rate register divisor.
    pub divisor: u8,
    /// DLPF setting.
    pub dlpf: u8,
    /// Noise bandwidth for the DLPF setting, Hz.
    pub dlpf_bandwidth_hz: f64,
    /// Recorded channel mode label.
    pub channel_mode: String,
    /// Recorded channel column names, in file order.
    pub channels: Vec<String>,
    /// Row encoding of the data file.
    pub format: String,
    /// Stream decimation factor, if streaming was active.
    pub stream_decimation: Option<u32>,
    /// Derived stream rate in Hz, if streaming was active.
    pub stream_rate_hz: Option<f64>,
    /// Acquisition software version.
    pub software_version: String,
}

impl SensorMetadata {
    /// Assemble the record from session and init outcomes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        started_at: DateTime<Utc>,
        sensor_id: u8,
        bus: String,
        address: u8,
        requested_rate_hz: f64,
        actual_rate_hz: f64,
        divisor: u8,
        dlpf: u8,
        channel_mode: &ChannelMode,
        format: &str,
        stream_decimation: Option<u32>,
    ) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            started_at,
            host,
            sensor_id,
            bus,
            address,
            requested_rate_hz,
            actual_rate_hz,
            divisor,
            dlpf,
            dlpf_bandwidth_hz: dlpf_bandwidth_hz(dlpf),
            channel_mode: channel_mode.label(),
            channels: channel_mode
                .channels()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            format: format.to_string(),
            stream_decimation,
            stream_rate_hz: stream_decimation.map(|d| actual_rate_hz / f64::from(d)),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Write the record as pretty JSON.
    pub fn write_json(&self, path: &Path) -> AppResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DaqError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> SensorMetadata {
        SensorMetadata::new(
            Utc::now(),
            2,
            "i2c-1".to_string(),
            0x69,
            100.0,
            100.0,
            9,
            1,
            &ChannelMode::Default,
            "csv",
            Some(2),
        )
    }

    #[test]
    fn test_stream_rate_derived() {
        let meta = sample_meta();
        assert_eq!(meta.stream_rate_hz, Some(50.0));
        assert_eq!(meta.dlpf_bandwidth_hz, 184.0);
        assert_eq!(meta.channels, vec!["ax", "ay", "gz"]);
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor2.meta.json");
        let meta = sample_meta();
        meta.write_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let reloaded: SensorMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded, meta);
    }
}
