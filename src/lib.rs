//! # imu_daq
//!
//! Core library for multi-sensor inertial data acquisition: fixed-cadence
//! sampling across bus-addressable motion sensors, durable per-sensor
//! recording, and a decimated line-oriented live stream with its consumer-side
//! ingestion.
//!
//! ## Crate Structure
//!
//! - **`config`**: structures for loading and validating application
//!   configuration from TOML files and the environment. See
//!   `config::Settings`.
//! - **`data`**: the core data model — channels, channel modes, samples and
//!   per-sensor run counters.
//! - **`error`**: the custom `DaqError` enum for centralized error handling.
//! - **`imu`**: the device driver layer — the `ImuSensor` seam, the
//!   register-level MPU-6050 driver, and a deterministic mock.
//! - **`metadata`**: the per-sensor companion metadata record, written once
//!   at writer start.
//! - **`rate`**: pure reconciliation of device-reported, stream-reported and
//!   locally observed sample rates.
//! - **`scheduler`**: the drift-corrected sampling scheduler and its
//!   cooperative `StopToken`.
//! - **`session`**: session lifecycle, output directory layout, and the
//!   teardown summary.
//! - **`stream`**: the newline-delimited wire protocol, the decimating
//!   encoder, and the consumer-side ingest with bounded ring buffers.
//! - **`writer`**: the per-sensor asynchronous durable writer (CSV/JSONL).
//!
//! The GUI, transport connection management and host configuration loading
//! are external collaborators; this crate only exposes the seams they
//! consume.

pub mod config;
pub mod data;
pub mod error;
pub mod imu;
pub mod metadata;
pub mod rate;
pub mod scheduler;
pub mod session;
pub mod stream;
pub mod writer;

pub use error::{AppResult, DaqError};
