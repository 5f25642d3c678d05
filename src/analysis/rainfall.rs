/// Per-event rainfall statistics: depth, duration, average and peak
/// intensity, and antecedent dry period.

use super::resample::ResampledSeries;
use super::rolling::{RollingWindow, clamp_noise};
use crate::model::{EventWindow, PeakIntensity, RainEvent};

/// Total recorded depth within `[first_rain, last_rain]`.
pub fn total_depth(rain: &ResampledSeries, event: &EventWindow) -> f64 {
    rain.slice(event.first_rain, event.last_rain)
        .map(|s| s.values().iter().flatten().sum())
        .unwrap_or(0.0)
}

/// Event duration in hours.
pub fn duration_hours(event: &EventWindow) -> f64 {
    (event.last_rain - event.first_rain).num_seconds() as f64 / 3600.0
}

/// Depth per hour over the whole event; undefined for zero-length events.
pub fn average_intensity(total_depth: f64, duration_hours: f64) -> Option<f64> {
    let intensity = total_depth / duration_hours;
    intensity.is_finite().then_some(intensity)
}

/// Maximum rolling `window_minutes` depth within the event, scaled to a
/// per-hour rate.
///
/// Only windows that lie entirely inside the event are considered (rolling
/// values at or after `first_rain + window`), unless the event is shorter
/// than the window, in which case every position counts.
pub fn peak_intensity(rain: &ResampledSeries, event: &EventWindow, window_minutes: u32) -> Option<f64> {
    let slice = rain.slice(event.first_rain, event.last_rain)?;
    let span_s = i64::from(window_minutes) * 60;

    let event_s = (event.last_rain - event.first_rain).num_seconds();
    let from = if event_s < span_s { 0 } else { span_s as usize };

    let mut window = RollingWindow::new(span_s);
    let mut peak: Option<f64> = None;

    for (i, value) in slice.values().iter().enumerate() {
        let key = i as i64;
        match value {
            Some(depth) => window.push(key, *depth),
            None => window.advance(key),
        }
        if i < from {
            continue;
        }
        if let Some(sum) = window.sum().map(clamp_noise) {
            peak = Some(peak.map_or(sum, |p: f64| p.max(sum)));
        }
    }

    peak.map(|p| p * 60.0 / f64::from(window_minutes))
        .filter(|rate| rate.is_finite())
}

/// Computes statistics for each event, in order.
///
/// The antecedent dry period is measured from the previous event's
/// `last_rain`; the first event has none.
pub fn rainfall_statistics(
    rain: &ResampledSeries,
    events: &[EventWindow],
    intensity_windows_minutes: &[u32],
) -> Vec<RainEvent> {
    let mut previous_last: Option<chrono::NaiveDateTime> = None;
    let mut stats = Vec::with_capacity(events.len());

    for event in events {
        let depth = total_depth(rain, event);
        let hours = duration_hours(event);

        let peak_intensities = intensity_windows_minutes
            .iter()
            .map(|&minutes| PeakIntensity {
                window_minutes: minutes,
                intensity: peak_intensity(rain, event, minutes),
            })
            .collect();

        let antecedent_dry_hours = previous_last
            .map(|last| (event.first_rain - last).num_seconds() as f64 / 3600.0);
        previous_last = Some(event.last_rain);

        stats.push(RainEvent {
            first_rain: event.first_rain,
            last_rain: event.last_rain,
            total_depth: depth,
            duration_hours: hours,
            avg_intensity: average_intensity(depth, hours),
            peak_intensities,
            antecedent_dry_hours,
        });
    }

    stats
}
