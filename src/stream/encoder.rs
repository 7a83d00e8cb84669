//! Stream encoder: decimation plus line serialization.
//!
//! Runs inline on the sampling task; it only formats and performs a
//! non-blocking push into an unbounded line channel. A transport collaborator
//! (socket writer, stdout, test harness) drains the receiver and appends the
//! newline delimiters.

use super::protocol::{StreamMeta, WireSample};
use crate::data::{Channel, Sample};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Per-sensor decimating encoder for one session.
pub struct StreamEncoder {
    tx: UnboundedSender<String>,
    decimation: u64,
    channels: Vec<Channel>,
    /// Successful-sample count per sensor since encoder start. The
    /// decimation modulus is per sensor, so read errors elsewhere never
    /// desynchronize it.
    counts: HashMap<u8, u64>,
    transport_gone: bool,
    lines_emitted: u64,
}

impl StreamEncoder {
    /// Create the encoder and emit the one-time metadata handshake before
    /// any sample line.
    pub fn new(meta: StreamMeta, channels: Vec<Channel>, tx: UnboundedSender<String>) -> Self {
        let decimation = u64::from(meta.decimation.max(1));
        let mut encoder = Self {
            tx,
            decimation,
            channels,
            counts: HashMap::new(),
            transport_gone: false,
            lines_emitted: 0,
        };
        match serde_json::to_string(&meta) {
            Ok(line) => encoder.send(line),
            Err(e) => warn!(error = %e, "stream metadata serialization failed"),
        }
        encoder
    }

    /// Offer one successfully read sample; emits every Nth per sensor.
    pub fn on_sample(&mut self, sample: &Sample) {
        let count = self.counts.entry(sample.sensor_id).or_insert(0);
        *count += 1;
        if *count % self.decimation != 0 {
            return;
        }
        let wire = WireSample {
            timestamp_ns: sample.timestamp_ns,
            t_s: sample.t_s,
            sensor_id: sample.sensor_id,
            channels: self
                .channels
                .iter()
                .filter_map(|c| sample.value(*c).map(|v| (*c, v)))
                .collect(),
        };
        self.send(wire.to_line());
    }

    /// Lines pushed so far, handshake included.
    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }

    fn send(&mut self, line: String) {
        if self.transport_gone {
            return;
        }
        if self.tx.send(line).is_err() {
            // Receiver dropped; streaming stops but acquisition continues.
            warn!("stream transport closed, disabling streaming");
            self.transport_gone = true;
            return;
        }
        self.lines_emitted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::protocol::{parse_line, StreamLine};
    use tokio::sync::mpsc::unbounded_channel;

    fn sample(sensor_id: u8, n: u64) -> Sample {
        Sample {
            timestamp_ns: n,
            t_s: n as f64 * 1e-9,
            sensor_id,
            values: vec![(Channel::Ax, n as f64), (Channel::Ay, 1.0), (Channel::Gz, 2.0)],
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_meta_precedes_samples() {
        let (tx, mut rx) = unbounded_channel();
        let mut enc = StreamEncoder::new(
            StreamMeta::new(vec![1], 100.0, 1),
            vec![Channel::Ax],
            tx,
        );
        enc.on_sample(&sample(1, 1));
        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 2);
        assert!(matches!(parse_line(&lines[0]), StreamLine::Config(_)));
        assert!(matches!(parse_line(&lines[1]), StreamLine::Sample(_)));
    }

    #[test]
    fn test_decimation_emits_floor_s_over_n() {
        let (tx, mut rx) = unbounded_channel();
        let mut enc = StreamEncoder::new(
            StreamMeta::new(vec![1], 100.0, 3),
            vec![Channel::Ax],
            tx,
        );
        for n in 0..10 {
            enc.on_sample(&sample(1, n));
        }
        // floor(10 / 3) = 3 sample lines after the handshake.
        let lines = drain(&mut rx);
        assert_eq!(lines.len() - 1, 3);
        assert_eq!(enc.lines_emitted(), 4);
    }

    #[test]
    fn test_per_sensor_counters_are_independent() {
        let (tx, mut rx) = unbounded_channel();
        let mut enc = StreamEncoder::new(
            StreamMeta::new(vec![1, 2], 100.0, 2),
            vec![Channel::Ax],
            tx,
        );
        // Sensor 1 delivers 6 samples, sensor 2 only 3 (read errors upstream
        // mean its samples simply never arrive here).
        for n in 0..6 {
            enc.on_sample(&sample(1, n));
            if n % 2 == 0 {
                enc.on_sample(&sample(2, n));
            }
        }
        let mut per_sensor: HashMap<u8, u64> = HashMap::new();
        for line in drain(&mut rx) {
            if let StreamLine::Sample(s) = parse_line(&line) {
                *per_sensor.entry(s.sensor_id).or_insert(0) += 1;
            }
        }
        assert_eq!(per_sensor[&1], 3);
        assert_eq!(per_sensor[&2], 1);
    }

    #[test]
    fn test_streamed_channels_are_a_subset() {
        let (tx, mut rx) = unbounded_channel();
        let mut enc = StreamEncoder::new(
            StreamMeta::new(vec![1], 100.0, 1),
            vec![Channel::Gz],
            tx,
        );
        enc.on_sample(&sample(1, 1));
        let lines = drain(&mut rx);
        match parse_line(&lines[1]) {
            StreamLine::Sample(s) => assert_eq!(s.channels, vec![(Channel::Gz, 2.0)]),
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_transport_is_non_fatal() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let mut enc =
            StreamEncoder::new(StreamMeta::new(vec![1], 100.0, 1), vec![Channel::Ax], tx);
        enc.on_sample(&sample(1, 1));
        assert_eq!(enc.lines_emitted(), 0);
    }
}
