//! Acquisition binary: loads settings, builds the sensor rigs and runs one
//! session, streaming decimated samples to stdout.
//!
//! Hardware bus handles are provided by the host integration layer; this
//! binary drives the built-in mock sensors so the pipeline can be exercised
//! end to end without devices attached.

use anyhow::Context;
use clap::Parser;
use imu_daq::config::Settings;
use imu_daq::imu::{common_actual_rate, initialize_sensors, ImuInitConfig, ImuSensor, MockImu};
use imu_daq::metadata::SensorMetadata;
use imu_daq::scheduler::{Sampler, SamplerConfig, SensorRig, StopToken};
use imu_daq::session::Session;
use imu_daq::stream::{StreamEncoder, StreamMeta};
use imu_daq::writer::{SensorWriter, WriterConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "imu_daq", about = "Inertial acquisition, logging and streaming")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the target sample rate in Hz.
    #[arg(long)]
    rate: Option<f64>,

    /// Stop after this many cycles.
    #[arg(long)]
    samples: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Override the output root directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Disable the live stream.
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(rate) = cli.rate {
        settings.acquisition.rate_hz = rate;
    }
    if let Some(samples) = cli.samples {
        settings.acquisition.sample_limit = Some(samples);
    }
    if let Some(seconds) = cli.duration {
        settings.acquisition.duration = Some(std::time::Duration::from_secs_f64(seconds));
    }
    if let Some(out_dir) = cli.out_dir {
        settings.storage.out_dir = out_dir;
    }
    if cli.no_stream {
        settings.stream.enabled = false;
    }
    settings.validate().context("validating settings")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let init_cfg = ImuInitConfig {
        dlpf: settings.acquisition.dlpf,
        accel_fs_g: settings.acquisition.accel_fs_g,
        gyro_fs_dps: settings.acquisition.gyro_fs_dps,
        requested_rate_hz: settings.acquisition.rate_hz,
    };
    let sensors: Vec<Box<dyn ImuSensor>> = settings
        .acquisition
        .sensors
        .iter()
        .map(|s| Box::new(MockImu::new(s.id)) as Box<dyn ImuSensor>)
        .collect();
    let ready = initialize_sensors(sensors, &init_cfg).await?;

    let sensor_ids: Vec<u8> = ready.iter().map(|(s, _)| s.sensor_id()).collect();
    let session = Session::create(&settings, sensor_ids.clone())?;

    let stream_decimation = settings
        .stream
        .enabled
        .then_some(settings.stream.decimation);
    let outcomes: Vec<_> = ready.iter().map(|(_, outcome)| *outcome).collect();
    let device_rate_hz = common_actual_rate(&outcomes, settings.acquisition.rate_hz);

    let mut rigs = Vec::with_capacity(ready.len());
    for (sensor, outcome) in ready {
        let sensor_id = sensor.sensor_id();
        let sensor_cfg = settings
            .acquisition
            .sensors
            .iter()
            .find(|s| s.id == sensor_id);
        let metadata = SensorMetadata::new(
            session.started_at,
            sensor_id,
            sensor_cfg.map(|s| s.bus.clone()).unwrap_or_default(),
            sensor_cfg.map(|s| s.address).unwrap_or(0x68),
            settings.acquisition.rate_hz,
            outcome.actual_rate_hz,
            outcome.divisor,
            settings.acquisition.dlpf,
            &settings.acquisition.channel_mode,
            settings.storage.format.extension(),
            stream_decimation,
        );
        let writer_cfg = WriterConfig {
            path: session.sensor_data_path(sensor_id, settings.storage.format),
            format: settings.storage.format,
            channels: settings.acquisition.channel_mode.channels(),
            flush_rows: settings.storage.flush_rows,
            flush_interval: settings.storage.flush_interval,
            fsync_each_flush: settings.storage.fsync_each_flush,
        };
        let writer = SensorWriter::spawn(
            sensor_id,
            writer_cfg,
            &metadata,
            &session.sensor_meta_path(sensor_id),
        )?;
        rigs.push(SensorRig::new(sensor, outcome, Some(writer)));
    }

    // Stdout is the demo transport: the encoder pushes lines, this task
    // appends the newline delimiters.
    let (encoder, drain) = if settings.stream.enabled {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let meta = StreamMeta::new(sensor_ids, device_rate_hz, settings.stream.decimation);
        let encoder = StreamEncoder::new(meta, settings.stream_channels(), tx);
        let drain = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                println!("{line}");
            }
        });
        (Some(encoder), Some(drain))
    } else {
        (None, None)
    };

    let token = StopToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping at next cycle boundary");
            signal_token.stop();
        }
    });

    let mut sampler_cfg = SamplerConfig::new(settings.acquisition.rate_hz);
    sampler_cfg.accel_fs_g = settings.acquisition.accel_fs_g;
    sampler_cfg.gyro_fs_dps = settings.acquisition.gyro_fs_dps;
    sampler_cfg.sample_limit = settings.acquisition.sample_limit;
    sampler_cfg.duration = settings.acquisition.duration;

    let mut sampler = Sampler::new(sampler_cfg, token);
    let summary = sampler
        .run(&settings.acquisition.channel_mode, rigs, encoder)
        .await?;

    if let Some(drain) = drain {
        if drain.await.is_err() {
            warn!("stream drain task did not exit cleanly");
        }
    }

    if summary.sensors.iter().all(|s| s.writer_error.is_some()) {
        anyhow::bail!("all sensor writers failed");
    }
    Ok(())
}
