//! Drift-corrected sampling scheduler.
//!
//! Drives one fixed-rate loop across all enabled devices using a monotonic
//! deadline sequence. The deadline is advanced by exactly one period per
//! cycle *before* reading, so long-run drift is bounded to a single period's
//! jitter instead of accumulating sleep-rounding error. A cycle whose
//! deadline has already passed is counted as an overrun and proceeds
//! immediately; there are no catch-up bursts.
//!
//! Per-device read failures are isolated: one sensor's bus hiccups never
//! abort the cycle or truncate data from healthy devices.

use crate::config::{MAX_RATE_HZ, MIN_RATE_HZ};
use crate::data::{Channel, ChannelMode, Sample, SensorRunState};
use crate::error::{AppResult, DriverError};
use crate::imu::registers::{accel_counts_to_ms2, gyro_counts_to_dps};
use crate::imu::{ImuSensor, InitOutcome};
use crate::session::{RunSummary, SensorSummary};
use crate::stream::StreamEncoder;
use crate::writer::SensorWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation token, polled once per cycle boundary.
///
/// The binary wires its signal handler to this; the library never installs
/// handlers itself, which keeps the scheduler unit-testable.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// Fresh, un-triggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; observed at the next cycle boundary.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Scheduler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, not yet running.
    Idle,
    /// Sampling loop active.
    Running,
    /// Stopping: writers draining and flushing.
    Draining,
    /// Run finished; summary available.
    Stopped,
}

/// Why the loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Signal,
    SampleLimit,
    Duration,
}

/// Scheduler configuration for one run.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Target cycle rate, Hz.
    pub rate_hz: f64,
    /// Accelerometer full-scale range in g, for count scaling.
    pub accel_fs_g: u16,
    /// Gyroscope full-scale range in deg/s, for count scaling.
    pub gyro_fs_dps: u16,
    /// Stop after this many cycles, if set.
    pub sample_limit: Option<u64>,
    /// Stop after this wall duration, if set.
    pub duration: Option<Duration>,
    /// Per-sensor read errors logged at warn before rate limiting kicks in.
    pub error_log_threshold: u64,
}

impl SamplerConfig {
    /// Config with the standard thresholds for a target rate.
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz,
            accel_fs_g: 2,
            gyro_fs_dps: 250,
            sample_limit: None,
            duration: None,
            error_log_threshold: 5,
        }
    }
}

/// One enabled sensor with its writer and per-run counters.
pub struct SensorRig {
    /// The device.
    pub sensor: Box<dyn ImuSensor>,
    /// Durable writer, if recording is enabled for this sensor.
    pub writer: Option<SensorWriter>,
    /// Per-run mutable counters.
    pub state: SensorRunState,
    writer_failed: bool,
}

impl SensorRig {
    /// Assemble a rig from an initialized sensor.
    pub fn new(
        sensor: Box<dyn ImuSensor>,
        outcome: InitOutcome,
        writer: Option<SensorWriter>,
    ) -> Self {
        let state = SensorRunState {
            divisor: outcome.divisor,
            actual_rate_hz: outcome.actual_rate_hz,
            ..Default::default()
        };
        Self {
            sensor,
            writer,
            state,
            writer_failed: false,
        }
    }
}

/// The sampling scheduler.
pub struct Sampler {
    cfg: SamplerConfig,
    token: StopToken,
    state: SchedulerState,
}

impl Sampler {
    /// New scheduler in the idle state.
    pub fn new(cfg: SamplerConfig, token: StopToken) -> Self {
        Self {
            cfg,
            token,
            state: SchedulerState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run the sampling loop to completion and drain the writers.
    ///
    /// Teardown always runs, whatever stop condition ended the loop, so
    /// every writer still open gets its final flush and fsync.
    pub async fn run(
        &mut self,
        channel_mode: &ChannelMode,
        mut rigs: Vec<SensorRig>,
        mut encoder: Option<StreamEncoder>,
    ) -> AppResult<RunSummary> {
        let channels = channel_mode.channels();
        let needs_accel = channels.iter().any(Channel::is_accel);
        let needs_gyro = channels.iter().any(Channel::is_gyro);
        let needs_temp = channels.contains(&Channel::TempC);

        // Same clamp the driver applies to the divisor: the loop must never
        // poll faster than the device produces data, or rows duplicate.
        let rate_hz = self.cfg.rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ);
        if (rate_hz - self.cfg.rate_hz).abs() > f64::EPSILON {
            warn!(
                requested_hz = self.cfg.rate_hz,
                clamped_hz = rate_hz,
                "pacing rate outside supported range, clamped"
            );
        }
        let period = Duration::from_nanos((1e9 / rate_hz).round() as u64);
        rigs.sort_by_key(|rig| rig.sensor.sensor_id());

        self.state = SchedulerState::Running;
        info!(
            rate_hz,
            period_ns = period.as_nanos() as u64,
            sensors = rigs.len(),
            "sampling started"
        );

        let epoch = Instant::now();
        let mut deadline = epoch;
        let mut cycles: u64 = 0;
        let mut overruns: u64 = 0;

        let reason = loop {
            // Deadline-based pacing: advance first, then either sleep or,
            // when the deadline already passed, count the overrun and go.
            deadline += period;
            let now = Instant::now();
            if now > deadline {
                overruns += 1;
                debug!(
                    cycle = cycles,
                    late_ns = (now - deadline).as_nanos() as u64,
                    "cycle overrun"
                );
            } else {
                tokio::time::sleep_until(deadline).await;
            }

            for rig in rigs.iter_mut() {
                let mut timestamp_ns = epoch.elapsed().as_nanos() as u64;
                // Timestamps are strictly increasing per sensor even at
                // clock granularity limits.
                if timestamp_ns <= rig.state.last_timestamp_ns {
                    timestamp_ns = rig.state.last_timestamp_ns + 1;
                }

                match read_values(
                    rig.sensor.as_mut(),
                    &channels,
                    needs_accel,
                    needs_gyro,
                    needs_temp,
                    self.cfg.accel_fs_g,
                    self.cfg.gyro_fs_dps,
                )
                .await
                {
                    Ok(values) => {
                        rig.state.last_timestamp_ns = timestamp_ns;
                        let sample = Sample {
                            timestamp_ns,
                            t_s: timestamp_ns as f64 / 1e9,
                            sensor_id: rig.sensor.sensor_id(),
                            values,
                        };
                        if let Some(enc) = encoder.as_mut() {
                            enc.on_sample(&sample);
                        }
                        if let Some(writer) = rig.writer.as_ref() {
                            if writer.enqueue(sample) {
                                rig.state.samples_written += 1;
                            } else if !rig.writer_failed {
                                rig.writer_failed = true;
                                warn!(
                                    sensor_id = rig.sensor.sensor_id(),
                                    "writer exited, sensor rows no longer recorded"
                                );
                            }
                        } else {
                            rig.state.samples_written += 1;
                        }
                    }
                    Err(err) => {
                        rig.state.read_errors += 1;
                        log_read_error(&err, rig.state.read_errors, self.cfg.error_log_threshold);
                    }
                }
            }

            cycles += 1;

            // Stop conditions, in priority order.
            if self.token.is_stopped() {
                break StopReason::Signal;
            }
            if let Some(limit) = self.cfg.sample_limit {
                if cycles >= limit {
                    break StopReason::SampleLimit;
                }
            }
            if let Some(duration) = self.cfg.duration {
                if epoch.elapsed() >= duration {
                    break StopReason::Duration;
                }
            }
        };

        self.state = SchedulerState::Draining;
        info!(?reason, cycles, overruns, "sampling loop exited, draining writers");

        let mut sensors = Vec::with_capacity(rigs.len());
        for rig in rigs {
            let sensor_id = rig.sensor.sensor_id();
            let (rows_written, output_path, writer_error) = match rig.writer {
                Some(writer) => {
                    let path = writer.path().to_path_buf();
                    match writer.stop().await {
                        Ok(stats) => (stats.rows_written, Some(path), None),
                        Err(e) => {
                            warn!(sensor_id, error = %e, "writer teardown reported failure");
                            (0, Some(path), Some(e.to_string()))
                        }
                    }
                }
                None => (rig.state.samples_written, None, None),
            };
            sensors.push(SensorSummary {
                sensor_id,
                rows_written,
                read_errors: rig.state.read_errors,
                actual_rate_hz: rig.state.actual_rate_hz,
                output_path,
                writer_error,
            });
        }

        self.state = SchedulerState::Stopped;
        let summary = RunSummary {
            cycles,
            overruns,
            sensors,
        };
        summary.log();
        Ok(summary)
    }
}

async fn read_values(
    sensor: &mut dyn ImuSensor,
    channels: &[Channel],
    needs_accel: bool,
    needs_gyro: bool,
    needs_temp: bool,
    accel_fs_g: u16,
    gyro_fs_dps: u16,
) -> Result<Vec<(Channel, f64)>, DriverError> {
    let accel = if needs_accel {
        Some(sensor.read_accel().await?)
    } else {
        None
    };
    let gyro = if needs_gyro {
        Some(sensor.read_gyro().await?)
    } else {
        None
    };
    let temp = if needs_temp {
        Some(sensor.read_temperature().await?)
    } else {
        None
    };

    let mut values = Vec::with_capacity(channels.len());
    for channel in channels {
        let value = match channel {
            Channel::Ax => accel.map(|(x, _, _)| accel_counts_to_ms2(x, accel_fs_g)),
            Channel::Ay => accel.map(|(_, y, _)| accel_counts_to_ms2(y, accel_fs_g)),
            Channel::Az => accel.map(|(_, _, z)| accel_counts_to_ms2(z, accel_fs_g)),
            Channel::Gx => gyro.map(|(x, _, _)| gyro_counts_to_dps(x, gyro_fs_dps)),
            Channel::Gy => gyro.map(|(_, y, _)| gyro_counts_to_dps(y, gyro_fs_dps)),
            Channel::Gz => gyro.map(|(_, _, z)| gyro_counts_to_dps(z, gyro_fs_dps)),
            Channel::TempC => temp,
        };
        if let Some(v) = value {
            if v.is_finite() {
                values.push((*channel, v));
            }
        }
    }
    Ok(values)
}

fn log_read_error(err: &DriverError, count: u64, threshold: u64) {
    if count <= threshold {
        warn!(sensor_id = err.sensor_id, error = %err, errors = count, "device read failed");
        if count == threshold {
            warn!(
                sensor_id = err.sensor_id,
                "further read errors logged every 100th occurrence"
            );
        }
    } else if count % 100 == 0 {
        warn!(
            sensor_id = err.sensor_id,
            errors = count,
            "device still failing reads"
        );
    } else {
        debug!(sensor_id = err.sensor_id, error = %err, "device read failed");
    }
}
