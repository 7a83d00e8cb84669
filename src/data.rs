//! Core data model: channels, channel modes, samples, per-sensor run state.

use serde::{Deserialize, Serialize};

/// One named measurement channel of an inertial sensor.
///
/// The wire and column names are fixed (`ax, ay, az, gx, gy, gz, temp_c`) and
/// shared between the durable output files and the streaming protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Acceleration X, m/s²
    Ax,
    /// Acceleration Y, m/s²
    Ay,
    /// Acceleration Z, m/s²
    Az,
    /// Angular rate X, deg/s
    Gx,
    /// Angular rate Y, deg/s
    Gy,
    /// Angular rate Z, deg/s
    Gz,
    /// Die temperature, °C
    TempC,
}

impl Channel {
    /// All channels, in canonical column order.
    pub const ALL: [Channel; 7] = [
        Channel::Ax,
        Channel::Ay,
        Channel::Az,
        Channel::Gx,
        Channel::Gy,
        Channel::Gz,
        Channel::TempC,
    ];

    /// Stable wire/column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ax => "ax",
            Channel::Ay => "ay",
            Channel::Az => "az",
            Channel::Gx => "gx",
            Channel::Gy => "gy",
            Channel::Gz => "gz",
            Channel::TempC => "temp_c",
        }
    }

    /// Parse a wire/column name.
    pub fn parse(name: &str) -> Option<Channel> {
        Channel::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// True for the accelerometer axes.
    pub fn is_accel(&self) -> bool {
        matches!(self, Channel::Ax | Channel::Ay | Channel::Az)
    }

    /// True for the gyroscope axes.
    pub fn is_gyro(&self) -> bool {
        matches!(self, Channel::Gx | Channel::Gy | Channel::Gz)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named channel subsets selectable per session.
///
/// The set is fixed once at session start and constant for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// ax, ay, gz — the planar-motion subset used for quick looks.
    Default,
    /// All three accelerometer axes.
    AccelOnly,
    /// All three gyroscope axes.
    GyroOnly,
    /// Every channel including temperature.
    All,
    /// Explicit channel list (deduplicated, canonical order preserved).
    Custom(Vec<Channel>),
}

impl ChannelMode {
    /// Channels in this mode, in canonical column order.
    pub fn channels(&self) -> Vec<Channel> {
        match self {
            ChannelMode::Default => vec![Channel::Ax, Channel::Ay, Channel::Gz],
            ChannelMode::AccelOnly => vec![Channel::Ax, Channel::Ay, Channel::Az],
            ChannelMode::GyroOnly => vec![Channel::Gx, Channel::Gy, Channel::Gz],
            ChannelMode::All => Channel::ALL.to_vec(),
            ChannelMode::Custom(list) => {
                let mut out: Vec<Channel> = Channel::ALL
                    .iter()
                    .copied()
                    .filter(|c| list.contains(c))
                    .collect();
                out.dedup();
                out
            }
        }
    }

    /// Short label for metadata records.
    pub fn label(&self) -> String {
        match self {
            ChannelMode::Default => "default".to_string(),
            ChannelMode::AccelOnly => "accel_only".to_string(),
            ChannelMode::GyroOnly => "gyro_only".to_string(),
            ChannelMode::All => "all".to_string(),
            ChannelMode::Custom(list) => {
                let names: Vec<&str> = list.iter().map(Channel::as_str).collect();
                format!("custom({})", names.join(","))
            }
        }
    }
}

impl Default for ChannelMode {
    fn default() -> Self {
        ChannelMode::Default
    }
}

/// One reading from one sensor at one instant.
///
/// `timestamp_ns` is monotonic from the session epoch and strictly increases
/// per sensor across the run; `t_s` is the same instant as relative seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Monotonic timestamp, nanoseconds since session epoch.
    pub timestamp_ns: u64,
    /// Relative time since session start, seconds.
    pub t_s: f64,
    /// Logical sensor identifier.
    pub sensor_id: u8,
    /// Channel values present in this sample, canonical order.
    pub values: Vec<(Channel, f64)>,
}

impl Sample {
    /// Value of one channel, if present in this sample.
    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.values
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, v)| *v)
    }
}

/// Per-sensor mutable counters for one run.
///
/// Mutated only by the sampling scheduler and that sensor's writer; read by
/// the summary reporter at teardown.
#[derive(Debug, Clone, Default)]
pub struct SensorRunState {
    /// Samples successfully read and routed.
    pub samples_written: u64,
    /// Failed device reads.
    pub read_errors: u64,
    /// Sample-rate register divisor chosen at init.
    pub divisor: u8,
    /// Device-measured actual rate in Hz, derived from the divisor.
    pub actual_rate_hz: f64,
    /// Last timestamp handed out for this sensor; enforces strict monotony.
    pub last_timestamp_ns: u64,
}
