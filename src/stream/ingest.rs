//! Consumer-side stream ingestion.
//!
//! One background task reads a line-oriented byte stream, parses each line
//! via the tagged-variant protocol, and deposits accepted samples into
//! bounded per-(sensor, channel) ring buffers. Malformed lines are dropped
//! silently and never stop the reader.
//!
//! The task owns exclusive write access to the buffers; external readers
//! only ever obtain point-in-time snapshot copies, so display code never
//! observes a buffer mutating mid-read.

use super::buffer::ChannelBuffer;
use super::protocol::{parse_line, StreamLine, StreamMeta};
use crate::data::Channel;
use crate::rate::{observed_rate, RateEstimate};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Payload-time window over accepted samples, for rate observation.
#[derive(Debug, Clone, Copy, Default)]
struct ObservedWindow {
    count: u64,
    first_t_s: f64,
    last_t_s: f64,
}

/// Shared view of the ingest state: buffers, handshake, counters.
///
/// Cheap to clone; all reads are non-blocking snapshot copies.
#[derive(Clone)]
pub struct IngestBuffers {
    buffers: Arc<RwLock<HashMap<(u8, Channel), ChannelBuffer>>>,
    meta: Arc<RwLock<Option<StreamMeta>>>,
    observed: Arc<Mutex<ObservedWindow>>,
    accepted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    started: std::time::Instant,
    capacity: usize,
}

impl IngestBuffers {
    fn new(capacity: usize) -> Self {
        Self {
            buffers: Arc::new(RwLock::new(HashMap::new())),
            meta: Arc::new(RwLock::new(None)),
            observed: Arc::new(Mutex::new(ObservedWindow::default())),
            accepted: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            started: std::time::Instant::now(),
            capacity,
        }
    }

    /// Point-in-time copy of one channel buffer, if it exists yet.
    pub fn snapshot(&self, sensor_id: u8, channel: Channel) -> Option<Vec<(f64, f64)>> {
        self.buffers
            .read()
            .get(&(sensor_id, channel))
            .map(ChannelBuffer::snapshot)
    }

    /// (sensor, channel) pairs seen so far, sorted.
    pub fn known_channels(&self) -> Vec<(u8, Channel)> {
        let mut keys: Vec<(u8, Channel)> = self.buffers.read().keys().copied().collect();
        keys.sort();
        keys
    }

    /// The stream-configuration handshake, once received.
    pub fn meta(&self) -> Option<StreamMeta> {
        self.meta.read().clone()
    }

    /// Accepted sample records.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Lines dropped as noise.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Locally observed stream rate, preferring payload time over wall
    /// clock (`min_samples` gates the payload path).
    pub fn observed_rate(&self, min_samples: u64) -> RateEstimate {
        let window = *self.observed.lock();
        observed_rate(
            window.count,
            window.first_t_s,
            window.last_t_s,
            self.started.elapsed(),
            min_samples,
        )
    }

    fn ingest_line(&self, line: &str) {
        match parse_line(line) {
            StreamLine::Config(meta) => {
                info!(
                    sensors = ?meta.sensors,
                    rate_hz = meta.rate_hz,
                    decimation = meta.decimation,
                    stream_rate_hz = meta.stream_rate_hz(),
                    "stream configuration received"
                );
                *self.meta.write() = Some(meta);
            }
            StreamLine::Sample(sample) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                {
                    let mut window = self.observed.lock();
                    if window.count == 0 {
                        window.first_t_s = sample.t_s;
                    }
                    window.last_t_s = sample.t_s;
                    window.count += 1;
                }
                let mut buffers = self.buffers.write();
                for (channel, value) in sample.channels {
                    buffers
                        .entry((sample.sensor_id, channel))
                        .or_insert_with(|| ChannelBuffer::new(self.capacity))
                        .push(sample.t_s, value);
                }
            }
            StreamLine::Noise => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Handle to the background reader.
pub struct IngestHandle {
    buffers: IngestBuffers,
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl IngestHandle {
    /// Shared buffer view; clone it before stopping if display code keeps
    /// reading afterwards.
    pub fn buffers(&self) -> IngestBuffers {
        self.buffers.clone()
    }

    /// Request cooperative termination.
    ///
    /// With `join` set, waits up to `timeout` for the reader to exit and
    /// returns whether it did. On a timeout the reader must be treated as
    /// abandoned, not retried.
    pub async fn stop(self, join: bool, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Release);
        self.notify.notify_one();
        if !join {
            return false;
        }
        match tokio::time::timeout(timeout, self.task).await {
            Ok(_) => true,
            Err(_) => {
                warn!("stream ingest did not stop within timeout, abandoning reader");
                false
            }
        }
    }
}

/// Start the background reader over any buffered line source.
pub fn start<R>(reader: R, buffer_capacity: usize) -> IngestHandle
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let buffers = IngestBuffers::new(buffer_capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());

    let task_buffers = buffers.clone();
    let task_stop = Arc::clone(&stop);
    let task_notify = Arc::clone(&notify);
    let task = tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            if task_stop.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                _ = task_notify.notified() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => task_buffers.ingest_line(&line),
                    Ok(None) => {
                        debug!("stream source reached end of input");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "stream source read failed, reader exiting");
                        break;
                    }
                },
            }
        }
        debug!(
            accepted = task_buffers.accepted(),
            dropped = task_buffers.dropped(),
            "stream ingest exited"
        );
    });

    IngestHandle {
        buffers,
        stop,
        notify,
        task,
    }
}
