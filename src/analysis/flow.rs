/// Runoff statistics for flow channels: volume, duration and peak flow rate,
/// over a whole record or over one window per rain event.
///
/// All statistics work on the recorded readings only; grid gaps are never
/// treated as zero flow.

use chrono::{Duration, NaiveDateTime};

use super::resample::{ResampledSeries, ceil_minute, floor_minute};
use super::rolling::RollingWindow;
use crate::model::{EventWindow, FlowChannelStats, FlowUnit, Reading};

// ---------------------------------------------------------------------------
// Individual statistics
// ---------------------------------------------------------------------------

/// Hours between the first and last recorded reading.
pub fn runoff_duration_hours(readings: &[Reading]) -> Option<f64> {
    let first = readings.first()?;
    let last = readings.last()?;
    Some((last.timestamp - first.timestamp).num_seconds() as f64 / 3600.0)
}

/// Trapezoidal integral of flow over time, with elapsed time in seconds.
///
/// Each consecutive pair of readings contributes the mean of the two rates
/// times the true elapsed seconds between them, so irregular sampling is
/// handled exactly. The rate's time unit is not applied here; callers
/// holding per-minute or per-hour rates divide by `FlowUnit::seconds`.
pub fn runoff_volume(readings: &[Reading]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    let volume: f64 = readings
        .windows(2)
        .map(|pair| {
            let elapsed_s = (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0;
            (pair[0].value + pair[1].value) / 2.0 * elapsed_s
        })
        .sum();
    Some(volume)
}

/// Peak flow rate averaged over `window_minutes`.
///
/// When the logger samples more coarsely than the averaging window, the
/// record is linearly interpolated onto a `window_minutes` grid and the grid
/// maximum is taken. Otherwise the maximum of the trailing
/// `window_minutes` rolling mean is taken, which suppresses single-sample
/// spikes.
pub fn peak_flow_rate(readings: &[Reading], window_minutes: u32) -> Option<f64> {
    let first = readings.first()?;
    if readings.len() == 1 {
        return first.value.is_finite().then_some(first.value);
    }

    let native_minutes = ((readings[1].timestamp - first.timestamp).num_seconds() as f64 / 60.0).round();
    let peak = if native_minutes > f64::from(window_minutes) {
        interpolated_peak(readings, window_minutes)
    } else {
        rolling_mean_peak(readings, window_minutes)
    };
    peak.filter(|p| p.is_finite())
}

fn rolling_mean_peak(readings: &[Reading], window_minutes: u32) -> Option<f64> {
    let origin = readings[0].timestamp;
    let mut window = RollingWindow::new(i64::from(window_minutes) * 60);
    let mut peak: Option<f64> = None;

    for reading in readings {
        window.push((reading.timestamp - origin).num_seconds(), reading.value);
        if let Some(mean) = window.mean() {
            peak = Some(peak.map_or(mean, |p: f64| p.max(mean)));
        }
    }
    peak
}

fn interpolated_peak(readings: &[Reading], window_minutes: u32) -> Option<f64> {
    let step = Duration::minutes(i64::from(window_minutes));
    let last = readings[readings.len() - 1];
    let end = ceil_minute(last.timestamp);

    let mut t = floor_minute(readings[0].timestamp);
    let mut idx = 0usize;
    let mut peak: Option<f64> = None;

    while t <= end {
        // Grid slots before the first reading have nothing to interpolate from.
        if t >= readings[0].timestamp {
            while idx + 1 < readings.len() && readings[idx + 1].timestamp <= t {
                idx += 1;
            }
            let value = if idx + 1 < readings.len() {
                interpolate(&readings[idx], &readings[idx + 1], t)
            } else {
                last.value
            };
            peak = Some(peak.map_or(value, |p: f64| p.max(value)));
        }
        t += step;
    }
    peak
}

fn interpolate(a: &Reading, b: &Reading, t: NaiveDateTime) -> f64 {
    let span = (b.timestamp - a.timestamp).num_milliseconds() as f64;
    if span <= 0.0 {
        return a.value;
    }
    let frac = ((t - a.timestamp).num_milliseconds() as f64 / span).clamp(0.0, 1.0);
    a.value + (b.value - a.value) * frac
}

// ---------------------------------------------------------------------------
// Whole-record and per-event statistics
// ---------------------------------------------------------------------------

fn stats_over(
    readings: &[Reading],
    unit: FlowUnit,
    peak_window_minutes: u32,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> FlowChannelStats {
    FlowChannelStats {
        start,
        end,
        time_unit: unit,
        runoff_volume: runoff_volume(readings),
        runoff_duration_hours: runoff_duration_hours(readings),
        peak_flow_rate: peak_flow_rate(readings, peak_window_minutes),
    }
}

/// Statistics over the whole resampled record.
pub fn flow_statistics(flow: &ResampledSeries, unit: FlowUnit, peak_window_minutes: u32) -> FlowChannelStats {
    stats_over(&flow.valid_readings(), unit, peak_window_minutes, flow.start(), flow.end())
}

/// Statistics for each rain event over `[first_rain, last_rain + drain]`,
/// capturing the storm response plus a fixed drainage allowance.
///
/// One entry per event, aligned with `events`; windows with no flow
/// readings yield `None` statistics rather than being skipped.
pub fn windowed_flow_statistics(
    flow: &ResampledSeries,
    unit: FlowUnit,
    events: &[EventWindow],
    drain_interval_hours: u32,
    peak_window_minutes: u32,
) -> Vec<FlowChannelStats> {
    let drain = Duration::hours(i64::from(drain_interval_hours));

    events
        .iter()
        .map(|event| {
            let start = event.first_rain;
            let end = event.last_rain + drain;
            let readings = flow
                .slice(start, end)
                .map(|s| s.valid_readings())
                .unwrap_or_default();
            stats_over(&readings, unit, peak_window_minutes, start, end)
        })
        .collect()
}
