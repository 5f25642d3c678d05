/// Rain event segmentation.
///
/// A rain event is a run of rain tips bounded on both sides by a dry span of
/// at least `hour_window` hours. Boundaries are found as edges on the
/// *validity* of two rolling sums over the resampled gauge record, not on
/// the raw tips:
///
/// ```text
///   rain_gauge              trailing sum (12h)      first_rain?
///   16:24:30      None      None
///   16:24:40     0.508      0.508                   <- undefined -> defined
///   16:24:50     1.524      2.032
///   16:25:00     1.016      3.048
///   16:25:10      None      3.048
/// ```
///
/// - `first_rain`: the trailing sum over `(t − W, t]` becomes defined at `t`
///   after being undefined at `t − 1s`.
/// - `last_rain`: the leading sum over `[t, t + W)` is defined at `t` and
///   undefined at `t + 1s`.
///
/// Recorded zeros count as "no rain" here, so a logger that writes explicit
/// zeros segments the same way as one that only writes tips.

use tracing::debug;

use super::resample::ResampledSeries;
use super::rolling::{RollingWindow, clamp_noise};
use crate::model::EventWindow;

/// Rolling sum of rain over `(t − span_s, t]` for every grid slot. `None`
/// where the window contains no rain.
pub fn trailing_rain_sums(values: &[Option<f64>], span_s: i64) -> Vec<Option<f64>> {
    let mut window = RollingWindow::new(span_s);
    let mut sums = Vec::with_capacity(values.len());

    for (i, value) in values.iter().enumerate() {
        let key = i as i64;
        match rain_tip(*value) {
            Some(depth) => window.push(key, depth),
            None => window.advance(key),
        }
        sums.push(window.sum().map(clamp_noise));
    }
    sums
}

/// Rolling sum of rain over `[t, t + span_s)` for every grid slot. `None`
/// where the window contains no rain.
pub fn leading_rain_sums(values: &[Option<f64>], span_s: i64) -> Vec<Option<f64>> {
    let mut window = RollingWindow::new(span_s);
    let mut sums = vec![None; values.len()];

    for (i, value) in values.iter().enumerate().rev() {
        let key = -(i as i64);
        match rain_tip(*value) {
            Some(depth) => window.push(key, depth),
            None => window.advance(key),
        }
        sums[i] = window.sum().map(clamp_noise);
    }
    sums
}

fn rain_tip(value: Option<f64>) -> Option<f64> {
    value.filter(|&v| v != 0.0)
}

/// Grid slots where the trailing sum turns from undefined to defined.
fn first_rain_indices(trailing: &[Option<f64>]) -> Vec<usize> {
    trailing
        .iter()
        .enumerate()
        .filter(|&(i, sum)| sum.is_some() && (i == 0 || trailing[i - 1].is_none()))
        .map(|(i, _)| i)
        .collect()
}

/// Grid slots where the leading sum turns from defined to undefined one
/// second later. A sum still defined at the final slot has no edge here.
fn last_rain_indices(leading: &[Option<f64>]) -> Vec<usize> {
    leading
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0].is_some() && pair[1].is_none())
        .map(|(i, _)| i)
        .collect()
}

/// Detects rain events in a resampled rain gauge record.
///
/// Returns `(first_rain, last_rain)` pairs, ascending and non-overlapping.
/// If the record ends while an event is still open, the record's last
/// timestamp closes it. Single-tip events (`first_rain == last_rain`) are
/// discarded.
pub fn segment_rain_events(rain: &ResampledSeries, hour_window_hours: u32) -> Vec<EventWindow> {
    let span_s = i64::from(hour_window_hours) * 3600;
    let values = rain.values();

    let firsts = first_rain_indices(&trailing_rain_sums(values, span_s));
    let mut lasts = last_rain_indices(&leading_rain_sums(values, span_s));

    if lasts.len() < firsts.len() {
        // Record ended mid-event.
        lasts.push(values.len() - 1);
    }
    debug_assert_eq!(firsts.len(), lasts.len(), "every first_rain pairs with a last_rain");

    let events: Vec<EventWindow> = firsts
        .into_iter()
        .zip(lasts)
        .filter(|(first, last)| first != last)
        .map(|(first, last)| EventWindow {
            first_rain: rain.timestamp(first),
            last_rain: rain.timestamp(last),
        })
        .collect();

    debug!(events = events.len(), hour_window_hours, "segmented rain events");
    events
}
