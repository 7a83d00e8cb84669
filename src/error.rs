//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle different kinds of errors, from I/O and
//! configuration issues to per-sensor bus problems.
//!
//! Per-read bus failures are deliberately *not* fatal: they are represented
//! by [`DriverError`] values that the sampling scheduler counts and logs per
//! sensor. Only errors that make a whole subsystem unusable (a writer's
//! file, the configuration, the run itself) are surfaced as [`DaqError`].

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device failed to initialize (power-up, register programming).
    Initialization,
    /// Bus transaction failed (NACK, timeout, transport error).
    Bus,
    /// Device is absent or identified as the wrong part.
    NotPresent,
    /// A caller-supplied parameter was rejected.
    InvalidParameter,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Bus => "bus",
            DriverErrorKind::NotPresent => "not_present",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Structured error for one sensor's driver, carrying the failure category.
///
/// A `Bus`-kind error on a read is recoverable: the scheduler increments the
/// sensor's error counter and moves on to the next device.
#[derive(Error, Debug, Clone)]
#[error("sensor {sensor_id} {kind} error: {message}")]
pub struct DriverError {
    /// Logical identifier of the failing sensor.
    pub sensor_id: u8,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Build a driver error for one sensor.
    pub fn new(sensor_id: u8, kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            sensor_id,
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a bus-transaction failure.
    pub fn bus(sensor_id: u8, message: impl Into<String>) -> Self {
        Self::new(sensor_id, DriverErrorKind::Bus, message)
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition pipeline.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured driver error with category.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// A sensor's durable output failed. Fatal to that sensor's writer only.
    #[error("Storage error for sensor {sensor_id}: {message}")]
    Storage {
        /// Sensor whose output is affected.
        sensor_id: u8,
        /// Human-readable detail.
        message: String,
    },

    /// Serialization of a row or metadata record failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No sensor survived initialization; the run cannot start.
    #[error("No sensor initialized successfully")]
    NoSensorsInitialized,

    /// A background worker panicked or was cancelled.
    #[error("Worker failure: {0}")]
    Worker(String),
}

impl DaqError {
    /// Shorthand for a per-sensor storage failure.
    pub fn storage(sensor_id: u8, message: impl Into<String>) -> Self {
        Self::Storage {
            sensor_id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::bus(3, "NACK on 0x3b");
        assert_eq!(err.to_string(), "sensor 3 bus error: NACK on 0x3b");
    }

    #[test]
    fn test_storage_error_display() {
        let err = DaqError::storage(1, "disk full");
        assert!(err.to_string().contains("sensor 1"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_driver_error_converts() {
        fn inner() -> AppResult<()> {
            Err(DriverError::new(0, DriverErrorKind::NotPresent, "WHO_AM_I mismatch").into())
        }
        assert!(matches!(inner(), Err(DaqError::Driver(_))));
    }
}
