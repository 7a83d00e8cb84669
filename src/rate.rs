//! Rate reconciliation: cross-checking device-reported, stream-reported and
//! locally observed sample rates.
//!
//! Every function here is a pure computation over its inputs; no state is
//! retained between calls.

use crate::imu::registers::base_rate_hz;
use std::time::Duration;

/// How a rate estimate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateQuality {
    /// From the payload's own relative-time field. Preferred.
    Payload,
    /// From wall-clock elapsed time; used when too few timestamped samples
    /// are available.
    WallClock,
    /// No observation yet; the handshake value stands in.
    Nominal,
}

/// A fused scalar rate plus its quality tag. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimate {
    /// Rate in Hz.
    pub hz: f64,
    /// Provenance of the estimate.
    pub quality: RateQuality,
}

/// Device rate implied by the register divisor chosen at init.
pub fn device_rate_from_divisor(dlpf: u8, divisor: u8) -> f64 {
    base_rate_hz(dlpf) / f64::from(u16::from(divisor) + 1)
}

/// Locally observed rate on the consumer.
///
/// Prefers the payload time span (`last_t_s - first_t_s` over `count - 1`
/// intervals); falls back to wall-clock elapsed time when fewer than
/// `min_samples` timestamped samples arrived.
pub fn observed_rate(
    count: u64,
    first_t_s: f64,
    last_t_s: f64,
    wall_elapsed: Duration,
    min_samples: u64,
) -> RateEstimate {
    let span = last_t_s - first_t_s;
    if count >= min_samples.max(2) && span > 0.0 {
        return RateEstimate {
            hz: (count - 1) as f64 / span,
            quality: RateQuality::Payload,
        };
    }
    let secs = wall_elapsed.as_secs_f64();
    if count > 0 && secs > 0.0 {
        return RateEstimate {
            hz: count as f64 / secs,
            quality: RateQuality::WallClock,
        };
    }
    RateEstimate {
        hz: 0.0,
        quality: RateQuality::Nominal,
    }
}

/// Result of reconciling the three independent rate signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Device-reported rate, Hz.
    pub device_hz: f64,
    /// Stream-reported rate from the handshake, Hz.
    pub stream_hz: f64,
    /// Locally observed rate.
    pub observed: RateEstimate,
    /// Fused estimate.
    pub fused: RateEstimate,
    /// Largest relative disagreement between the observed rate and the
    /// stream-reported rate.
    pub relative_error: f64,
}

/// Deterministically fuse the three rate signals.
///
/// The stream rate is the reference for the observed consumer-side rate
/// (decimation already applied). An observation of payload quality wins the
/// fusion; otherwise the handshake value does, tagged nominal.
pub fn reconcile(device_hz: f64, decimation: u32, observed: RateEstimate) -> Reconciliation {
    let stream_hz = device_hz / f64::from(decimation.max(1));
    let relative_error = if stream_hz > 0.0 && observed.quality != RateQuality::Nominal {
        (observed.hz - stream_hz).abs() / stream_hz
    } else {
        0.0
    };
    let fused = match observed.quality {
        RateQuality::Payload => observed,
        RateQuality::WallClock | RateQuality::Nominal => RateEstimate {
            hz: stream_hz,
            quality: RateQuality::Nominal,
        },
    };
    Reconciliation {
        device_hz,
        stream_hz,
        observed,
        fused,
        relative_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_rate_from_divisor() {
        assert_eq!(device_rate_from_divisor(1, 9), 100.0);
        assert_eq!(device_rate_from_divisor(0, 79), 100.0);
    }

    #[test]
    fn test_observed_prefers_payload() {
        // 101 samples spanning exactly 1 s of payload time: 100 Hz.
        let est = observed_rate(101, 0.0, 1.0, Duration::from_secs(30), 10);
        assert_eq!(est.quality, RateQuality::Payload);
        assert!((est.hz - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_observed_falls_back_to_wall_clock() {
        let est = observed_rate(5, 0.0, 0.0, Duration::from_secs(1), 10);
        assert_eq!(est.quality, RateQuality::WallClock);
        assert!((est.hz - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_observed_nominal_when_empty() {
        let est = observed_rate(0, 0.0, 0.0, Duration::ZERO, 10);
        assert_eq!(est.quality, RateQuality::Nominal);
    }

    #[test]
    fn test_reconcile_payload_wins() {
        let observed = RateEstimate {
            hz: 49.7,
            quality: RateQuality::Payload,
        };
        let r = reconcile(100.0, 2, observed);
        assert_eq!(r.stream_hz, 50.0);
        assert_eq!(r.fused, observed);
        assert!((r.relative_error - 0.006).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_nominal_fallback() {
        let observed = RateEstimate {
            hz: 0.0,
            quality: RateQuality::Nominal,
        };
        let r = reconcile(200.0, 4, observed);
        assert_eq!(r.fused.hz, 50.0);
        assert_eq!(r.fused.quality, RateQuality::Nominal);
        assert_eq!(r.relative_error, 0.0);
    }
}
