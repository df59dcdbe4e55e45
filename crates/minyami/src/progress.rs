use std::time::Duration;

use crate::queue::RunState;

/// Remaining seconds, extrapolated from the average time per finished segment.
pub fn eta_seconds(elapsed_ms: u128, finished: usize, total: usize) -> Option<u64> {
    if finished == 0 {
        return None;
    }
    let elapsed = elapsed_ms as f64;
    let remaining = (elapsed / finished as f64 * total as f64 - elapsed) / 1000.;
    Some(remaining.round().max(0.) as u64)
}

/// `1h 2m 3s`, `2m 5s` or `90s`.
///
/// Plain seconds are used below two minutes.
pub fn format_eta(seconds: u64) -> String {
    if seconds < 120 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!(
            "{}h {}m {}s",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    }
}

fn elapsed_seconds(elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64().round();
    (seconds > 0.).then_some(seconds)
}

/// Finished segments per second.
pub fn speed_by_chunk(finished: usize, elapsed: Duration) -> Option<f64> {
    if finished == 0 {
        return None;
    }
    elapsed_seconds(elapsed).map(|seconds| finished as f64 / seconds)
}

/// Downloaded playback time per wall clock time.
pub fn speed_by_ratio(finished: usize, segment_duration: f32, elapsed: Duration) -> Option<f64> {
    if finished == 0 {
        return None;
    }
    elapsed_seconds(elapsed).map(|seconds| finished as f64 * segment_duration as f64 / seconds)
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

/// Progress line printed after every finished segment.
pub fn progress_line(
    filename: &str,
    state: &RunState,
    segment_duration: f32,
    elapsed: Duration,
) -> String {
    let finished = state.finished_segments;
    let total = state.total_segments;
    let percentage = if total == 0 {
        0.
    } else {
        finished as f64 / total as f64 * 100.
    };
    let eta = eta_seconds(elapsed.as_millis(), finished, total)
        .map_or_else(|| "-".to_string(), format_eta);

    format!(
        "Processing {filename} finished. ({finished} / {total} or {percentage:.2}% | Avg Speed: {} chunks/s or {}x | ETA: {eta})",
        format_metric(speed_by_chunk(finished, elapsed)),
        format_metric(speed_by_ratio(finished, segment_duration, elapsed)),
    )
}
