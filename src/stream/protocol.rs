//! Line-oriented streaming wire protocol.
//!
//! Newline-delimited JSON. The first line of a stream is a single
//! configuration record tagged `"type": "stream_config"`; every later line is
//! one retained sample. Parsing is tagged-variant: the config variant is
//! attempted first and any tag mismatch falls through to the sample variant.
//! Anything else — plain-text status lines included — is classified as noise
//! and is non-fatal to consumers.

use crate::data::Channel;
use serde::{Deserialize, Serialize};

/// Tag value for the configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamConfigTag {
    /// The only accepted tag.
    #[serde(rename = "stream_config")]
    StreamConfig,
}

/// One-time stream metadata handshake, immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMeta {
    #[serde(rename = "type")]
    tag: StreamConfigTag,
    /// Enabled sensor identifiers.
    pub sensors: Vec<u8>,
    /// Device sample rate, Hz.
    pub rate_hz: f64,
    /// Stream decimation factor.
    pub decimation: u32,
}

impl StreamMeta {
    /// Build the handshake record.
    pub fn new(sensors: Vec<u8>, rate_hz: f64, decimation: u32) -> Self {
        Self {
            tag: StreamConfigTag::StreamConfig,
            sensors,
            rate_hz,
            decimation: decimation.max(1),
        }
    }

    /// Derived stream rate: device rate over decimation.
    pub fn stream_rate_hz(&self) -> f64 {
        self.rate_hz / f64::from(self.decimation)
    }
}

/// One retained sample as it appears on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WireSample {
    /// Monotonic timestamp, nanoseconds.
    pub timestamp_ns: u64,
    /// Relative time since start, seconds.
    pub t_s: f64,
    /// Logical sensor identifier.
    pub sensor_id: u8,
    /// Channel values present on this line.
    pub channels: Vec<(Channel, f64)>,
}

impl WireSample {
    /// Serialize to one wire line (no trailing newline).
    pub fn to_line(&self) -> String {
        let mut obj = serde_json::Map::new();
        obj.insert("timestamp_ns".into(), self.timestamp_ns.into());
        if let Some(t) = serde_json::Number::from_f64(self.t_s) {
            obj.insert("t_s".into(), t.into());
        }
        obj.insert("sensor_id".into(), self.sensor_id.into());
        for (channel, value) in &self.channels {
            if let Some(num) = serde_json::Number::from_f64(*value) {
                obj.insert(channel.as_str().into(), num.into());
            }
        }
        serde_json::Value::Object(obj).to_string()
    }

    /// Accept a JSON object as a sample record.
    ///
    /// Requires a `sensor_id` and a `timestamp_ns`; a channel key with a
    /// non-numeric value rejects the whole record. Other unknown keys are
    /// ignored. Numeric range is not otherwise validated.
    fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let sensor_id = u8::try_from(obj.get("sensor_id")?.as_u64()?).ok()?;
        let timestamp_ns = obj.get("timestamp_ns")?.as_u64()?;
        let t_s = match obj.get("t_s") {
            Some(v) => v.as_f64()?,
            None => timestamp_ns as f64 / 1e9,
        };
        let mut channels = Vec::new();
        for channel in Channel::ALL {
            if let Some(v) = obj.get(channel.as_str()) {
                channels.push((channel, v.as_f64()?));
            }
        }
        Some(Self {
            timestamp_ns,
            t_s,
            sensor_id,
            channels,
        })
    }
}

/// Classification of one received line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    /// Stream-configuration handshake.
    Config(StreamMeta),
    /// Retained sample.
    Sample(WireSample),
    /// Anything else; tolerated and dropped.
    Noise,
}

/// Parse one line of the stream.
pub fn parse_line(line: &str) -> StreamLine {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return StreamLine::Noise,
    };
    // Config variant first; a decode or tag mismatch falls through.
    if let Ok(meta) = serde_json::from_value::<StreamMeta>(value.clone()) {
        return StreamLine::Config(meta);
    }
    match WireSample::from_value(&value) {
        Some(sample) => StreamLine::Sample(sample),
        None => StreamLine::Noise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_roundtrip() {
        let meta = StreamMeta::new(vec![1, 2], 100.0, 2);
        let line = serde_json::to_string(&meta).unwrap();
        assert!(line.contains("\"type\":\"stream_config\""));
        match parse_line(&line) {
            StreamLine::Config(parsed) => {
                assert_eq!(parsed, meta);
                assert_eq!(parsed.stream_rate_hz(), 50.0);
            }
            other => panic!("expected config, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_roundtrip() {
        let sample = WireSample {
            timestamp_ns: 123,
            t_s: 1.23e-7,
            sensor_id: 2,
            channels: vec![(Channel::Ax, 0.5), (Channel::Gz, -2.0)],
        };
        match parse_line(&sample.to_line()) {
            StreamLine::Sample(parsed) => assert_eq!(parsed, sample),
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_keys_is_noise() {
        assert_eq!(parse_line(r#"{"t_s": 0.5, "ax": 1.0}"#), StreamLine::Noise);
        assert_eq!(
            parse_line(r#"{"sensor_id": 1, "ax": 1.0}"#),
            StreamLine::Noise
        );
    }

    #[test]
    fn test_non_numeric_channel_value_is_noise() {
        assert_eq!(
            parse_line(r#"{"sensor_id": 1, "timestamp_ns": 5, "ax": "oops"}"#),
            StreamLine::Noise
        );
    }

    #[test]
    fn test_plain_text_status_is_noise() {
        assert_eq!(parse_line("run complete, 200 rows"), StreamLine::Noise);
        assert_eq!(parse_line(""), StreamLine::Noise);
    }

    #[test]
    fn test_wrong_tag_falls_through_to_sample() {
        // A record carrying an unrelated "type" key still parses as a sample
        // when it has the required fields; no string-prefix special-casing.
        let line = r#"{"type": "status", "sensor_id": 3, "timestamp_ns": 9, "ay": 0.25}"#;
        match parse_line(line) {
            StreamLine::Sample(s) => {
                assert_eq!(s.sensor_id, 3);
                assert_eq!(s.channels, vec![(Channel::Ay, 0.25)]);
            }
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_t_s_derived_when_absent() {
        let line = r#"{"sensor_id": 1, "timestamp_ns": 2000000000}"#;
        match parse_line(line) {
            StreamLine::Sample(s) => assert!((s.t_s - 2.0).abs() < 1e-12),
            other => panic!("expected sample, got {:?}", other),
        }
    }
}
