//! Read-side aggregation over a set of session events.

use streamlens_types::{SessionAnalytics, SessionEvent};

/// Computes aggregate analytics over the given events. Pure — no I/O.
///
/// Averages (startup time, bitrate) are taken over the events that
/// actually measured the field and default to `0.0` when none did. Total
/// buffering sums only measured values.
///
/// Total errors is deliberately asymmetric: it sums over *all* events with
/// a missing `error_count` contributing zero, instead of filtering on
/// presence like the other three. The upstream contract treats the field
/// as always populated, and the quirk is preserved rather than corrected.
pub fn compute_analytics(events: &[SessionEvent]) -> SessionAnalytics {
    let startups: Vec<i64> = events
        .iter()
        .filter_map(|e| e.metrics.startup_time_ms)
        .collect();
    let average_startup_time_ms = if startups.is_empty() {
        0.0
    } else {
        startups.iter().sum::<i64>() as f64 / startups.len() as f64
    };

    let total_buffering_ms: i64 = events
        .iter()
        .filter_map(|e| e.metrics.buffering_duration_ms)
        .sum();

    let bitrates: Vec<i32> = events.iter().filter_map(|e| e.metrics.bitrate).collect();
    let average_bitrate_kbps = if bitrates.is_empty() {
        0.0
    } else {
        bitrates.iter().map(|&b| i64::from(b)).sum::<i64>() as f64 / bitrates.len() as f64
    };

    let total_errors: i64 = events
        .iter()
        .map(|e| i64::from(e.metrics.error_count.unwrap_or(0)))
        .sum();

    SessionAnalytics {
        average_startup_time_ms,
        total_buffering_ms,
        average_bitrate_kbps,
        total_errors,
    }
}
