//! Per-sensor asynchronous durable writer.
//!
//! Each sensor owns one unbounded queue and one background worker task.
//! `enqueue` never blocks the sampling cycle; the worker serializes rows and
//! flushes on row-count or time thresholds. The final flush on `stop()`
//! always fsyncs, so no buffered row is lost on a clean stop.
//!
//! The queue is unbounded by contract; the operational invariant is that
//! disk throughput exceeds the sustained sample rate.

use crate::config::OutputFormat;
use crate::data::{Channel, Sample};
use crate::error::{AppResult, DaqError};
use crate::metadata::SensorMetadata;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Writer configuration for one sensor's output file.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Data file path.
    pub path: PathBuf,
    /// Row encoding.
    pub format: OutputFormat,
    /// Channel columns, in file order.
    pub channels: Vec<Channel>,
    /// Flush after this many buffered rows.
    pub flush_rows: usize,
    /// Flush after this much time since the last flush.
    pub flush_interval: Duration,
    /// fsync on every flush (the final flush always syncs).
    pub fsync_each_flush: bool,
}

enum WriterMsg {
    Row(Sample),
    Stop,
}

/// Worker statistics returned from `stop()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterStats {
    /// Rows durably written.
    pub rows_written: u64,
    /// Flushes performed, final flush included.
    pub flushes: u64,
}

enum Backend {
    Csv(csv::Writer<File>),
    Jsonl(BufWriter<File>),
}

impl Backend {
    fn open(cfg: &WriterConfig) -> AppResult<Self> {
        let file = File::create(&cfg.path)?;
        match cfg.format {
            OutputFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(file);
                let mut header = vec![
                    "timestamp_ns".to_string(),
                    "t_s".to_string(),
                    "sensor_id".to_string(),
                ];
                header.extend(cfg.channels.iter().map(|c| c.as_str().to_string()));
                wtr.write_record(&header)
                    .map_err(|e| DaqError::Serialization(e.to_string()))?;
                Ok(Backend::Csv(wtr))
            }
            OutputFormat::Jsonl => Ok(Backend::Jsonl(BufWriter::new(file))),
        }
    }

    fn write_row(&mut self, sample: &Sample, channels: &[Channel]) -> AppResult<()> {
        match self {
            Backend::Csv(wtr) => {
                let mut record = vec![
                    sample.timestamp_ns.to_string(),
                    format!("{:.9}", sample.t_s),
                    sample.sensor_id.to_string(),
                ];
                for channel in channels {
                    record.push(
                        sample
                            .value(*channel)
                            .map(|v| v.to_string())
                            .unwrap_or_default(),
                    );
                }
                wtr.write_record(&record)
                    .map_err(|e| DaqError::Serialization(e.to_string()))?;
            }
            Backend::Jsonl(out) => {
                let mut obj = serde_json::Map::new();
                obj.insert("timestamp_ns".into(), sample.timestamp_ns.into());
                obj.insert(
                    "t_s".into(),
                    serde_json::Number::from_f64(sample.t_s)
                        .ok_or_else(|| {
                            DaqError::Serialization("non-finite t_s".to_string())
                        })?
                        .into(),
                );
                obj.insert("sensor_id".into(), sample.sensor_id.into());
                for channel in channels {
                    if let Some(v) = sample.value(*channel) {
                        if let Some(num) = serde_json::Number::from_f64(v) {
                            obj.insert(channel.as_str().into(), num.into());
                        }
                    }
                }
                let line = serde_json::Value::Object(obj).to_string();
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, fsync: bool) -> std::io::Result<()> {
        match self {
            Backend::Csv(wtr) => {
                wtr.flush()?;
                if fsync {
                    wtr.get_ref().sync_all()?;
                }
            }
            Backend::Jsonl(out) => {
                out.flush()?;
                if fsync {
                    out.get_ref().sync_all()?;
                }
            }
        }
        Ok(())
    }
}

/// Handle to one sensor's writer worker.
pub struct SensorWriter {
    sensor_id: u8,
    tx: UnboundedSender<WriterMsg>,
    task: JoinHandle<AppResult<WriterStats>>,
    path: PathBuf,
}

impl SensorWriter {
    /// Open the data file, write the companion metadata once, and start the
    /// background worker.
    pub fn spawn(
        sensor_id: u8,
        cfg: WriterConfig,
        metadata: &SensorMetadata,
        meta_path: &std::path::Path,
    ) -> AppResult<Self> {
        metadata.write_json(meta_path)?;
        let backend = Backend::open(&cfg)?;
        info!(sensor_id, path = %cfg.path.display(), "writer started");

        let (tx, rx) = unbounded_channel();
        let path = cfg.path.clone();
        let task = tokio::spawn(worker(sensor_id, cfg, backend, rx));
        Ok(Self {
            sensor_id,
            tx,
            task,
            path,
        })
    }

    /// Data file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Push one row; returns false if the worker has exited (output aborted).
    pub fn enqueue(&self, sample: Sample) -> bool {
        self.tx.send(WriterMsg::Row(sample)).is_ok()
    }

    /// Send the stop sentinel and wait for the worker to drain and exit.
    ///
    /// The worker's final flush has fsynced by the time this returns Ok.
    pub async fn stop(self) -> AppResult<WriterStats> {
        // A closed channel means the worker already exited; join it anyway to
        // surface its error.
        let _ = self.tx.send(WriterMsg::Stop);
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(DaqError::Worker(format!(
                "writer for sensor {} panicked: {}",
                self.sensor_id, join_err
            ))),
        }
    }
}

async fn worker(
    sensor_id: u8,
    cfg: WriterConfig,
    mut backend: Backend,
    mut rx: UnboundedReceiver<WriterMsg>,
) -> AppResult<WriterStats> {
    let mut stats = WriterStats::default();
    let mut rows_since_flush = 0usize;
    let mut last_flush = tokio::time::Instant::now();

    let result = loop {
        let next_flush = last_flush + cfg.flush_interval;
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WriterMsg::Row(sample)) => {
                    if let Err(e) = backend.write_row(&sample, &cfg.channels) {
                        break Err(e);
                    }
                    stats.rows_written += 1;
                    rows_since_flush += 1;
                    if rows_since_flush >= cfg.flush_rows {
                        if let Err(e) = backend.flush(cfg.fsync_each_flush) {
                            break Err(DaqError::Io(e));
                        }
                        stats.flushes += 1;
                        rows_since_flush = 0;
                        last_flush = tokio::time::Instant::now();
                    }
                }
                // Stop sentinel or all senders gone: drain is complete since
                // the queue is popped in order.
                Some(WriterMsg::Stop) | None => break Ok(()),
            },
            _ = tokio::time::sleep_until(next_flush) => {
                if rows_since_flush > 0 {
                    if let Err(e) = backend.flush(cfg.fsync_each_flush) {
                        break Err(DaqError::Io(e));
                    }
                    stats.flushes += 1;
                    rows_since_flush = 0;
                }
                last_flush = tokio::time::Instant::now();
            }
        }
    };

    match result {
        Ok(()) => {
            // Final flush always fsyncs: rows are durable once stop() returns.
            backend.flush(true)?;
            stats.flushes += 1;
            debug!(sensor_id, rows = stats.rows_written, "writer drained");
            Ok(stats)
        }
        Err(e) => {
            error!(sensor_id, error = %e, "writer aborted, sensor output lost");
            Err(match e {
                DaqError::Io(io) => DaqError::storage(sensor_id, io.to_string()),
                DaqError::Serialization(msg) => DaqError::storage(sensor_id, msg),
                other => other,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChannelMode;
    use chrono::Utc;

    fn sample(sensor_id: u8, n: u64) -> Sample {
        Sample {
            timestamp_ns: n * 10_000_000,
            t_s: n as f64 * 0.01,
            sensor_id,
            values: vec![(Channel::Ax, 0.1 * n as f64), (Channel::Gz, -1.0)],
        }
    }

    fn writer_cfg(dir: &std::path::Path, format: OutputFormat) -> WriterConfig {
        WriterConfig {
            path: dir.join(format!("sensor1.{}", format.extension())),
            format,
            channels: vec![Channel::Ax, Channel::Ay, Channel::Gz],
            flush_rows: 8,
            flush_interval: Duration::from_millis(200),
            fsync_each_flush: false,
        }
    }

    fn meta() -> SensorMetadata {
        SensorMetadata::new(
            Utc::now(),
            1,
            "i2c-1".to_string(),
            0x68,
            100.0,
            100.0,
            9,
            1,
            &ChannelMode::Default,
            "csv",
            None,
        )
    }

    #[tokio::test]
    async fn test_csv_rows_all_present_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = writer_cfg(dir.path(), OutputFormat::Csv);
        let path = cfg.path.clone();
        let writer = SensorWriter::spawn(1, cfg, &meta(), &dir.path().join("m.json")).unwrap();

        let k = 57;
        for n in 0..k {
            assert!(writer.enqueue(sample(1, n)));
        }
        let stats = writer.stop().await.unwrap();
        assert_eq!(stats.rows_written, k);

        // File is re-openable immediately after stop returns.
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len() as u64, k + 1, "header plus k rows");
        assert_eq!(lines[0], "timestamp_ns,t_s,sensor_id,ax,ay,gz");
        // Absent channel serializes as an empty field.
        assert!(lines[1].contains(",,"));
    }

    #[tokio::test]
    async fn test_jsonl_rows_omit_absent_channels() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = writer_cfg(dir.path(), OutputFormat::Jsonl);
        let path = cfg.path.clone();
        let writer = SensorWriter::spawn(1, cfg, &meta(), &dir.path().join("m.json")).unwrap();
        writer.enqueue(sample(1, 3));
        writer.stop().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let row: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(row["sensor_id"], 1);
        assert_eq!(row["timestamp_ns"], 30_000_000u64);
        assert!(row.get("ax").is_some());
        assert!(row.get("ay").is_none());
    }

    #[tokio::test]
    async fn test_metadata_written_once_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = writer_cfg(dir.path(), OutputFormat::Csv);
        let meta_path = dir.path().join("sensor1.meta.json");
        let writer = SensorWriter::spawn(1, cfg, &meta(), &meta_path).unwrap();
        assert!(meta_path.is_file());
        writer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_threshold_flushes_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = writer_cfg(dir.path(), OutputFormat::Csv);
        cfg.flush_rows = 1000; // row threshold never trips
        let path = cfg.path.clone();
        let writer = SensorWriter::spawn(1, cfg, &meta(), &dir.path().join("m.json")).unwrap();
        writer.enqueue(sample(1, 0));
        tokio::time::sleep(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2, "row flushed by the time threshold");
        writer.stop().await.unwrap();
    }
}
