//! Session lifecycle: one bounded acquisition run with its own output
//! directory, plus the teardown summary.

use crate::config::{OutputFormat, Settings};
use crate::data::ChannelMode;
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

/// One continuous acquisition run. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Session {
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Target sample rate, Hz.
    pub rate_hz: f64,
    /// Recorded channel subset.
    pub channel_mode: ChannelMode,
    /// Enabled sensor identifiers, ascending.
    pub sensor_ids: Vec<u8>,
    /// Session output directory.
    pub dir: PathBuf,
}

impl Session {
    /// Create the session and its timestamped output directory.
    pub fn create(settings: &Settings, sensor_ids: Vec<u8>) -> AppResult<Self> {
        let started_at = Utc::now();
        let dir = settings
            .storage
            .out_dir
            .join(format!("imu_{}", started_at.format("%Y%m%d_%H%M%S")));
        std::fs::create_dir_all(&dir)?;
        let mut sensor_ids = sensor_ids;
        sensor_ids.sort_unstable();
        info!(dir = %dir.display(), sensors = ?sensor_ids, "session created");
        Ok(Self {
            started_at,
            rate_hz: settings.acquisition.rate_hz,
            channel_mode: settings.acquisition.channel_mode.clone(),
            sensor_ids,
            dir,
        })
    }

    /// Data file path for one sensor.
    pub fn sensor_data_path(&self, sensor_id: u8, format: OutputFormat) -> PathBuf {
        self.dir
            .join(format!("sensor{}.{}", sensor_id, format.extension()))
    }

    /// Companion metadata path for one sensor.
    pub fn sensor_meta_path(&self, sensor_id: u8) -> PathBuf {
        self.dir.join(format!("sensor{}.meta.json", sensor_id))
    }
}

/// Teardown report for one sensor.
#[derive(Debug, Clone)]
pub struct SensorSummary {
    /// Logical sensor identifier.
    pub sensor_id: u8,
    /// Rows durably written.
    pub rows_written: u64,
    /// Failed device reads.
    pub read_errors: u64,
    /// Device-measured rate, Hz.
    pub actual_rate_hz: f64,
    /// Data file, if a writer was attached.
    pub output_path: Option<PathBuf>,
    /// Writer failure, if its output was aborted.
    pub writer_error: Option<String>,
}

/// Teardown report for the whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Cycles executed.
    pub cycles: u64,
    /// Cycles that began after their deadline.
    pub overruns: u64,
    /// Per-sensor reports, ascending by id.
    pub sensors: Vec<SensorSummary>,
}

impl RunSummary {
    /// Log the summary at info level, one line per sensor.
    pub fn log(&self) {
        info!(
            cycles = self.cycles,
            overruns = self.overruns,
            "acquisition finished"
        );
        for s in &self.sensors {
            info!(
                sensor_id = s.sensor_id,
                rows = s.rows_written,
                read_errors = s.read_errors,
                actual_rate_hz = s.actual_rate_hz,
                output = %s
                    .output_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                writer_error = s.writer_error.as_deref().unwrap_or("none"),
                "sensor summary"
            );
        }
    }
}
