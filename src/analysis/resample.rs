/// Resampling of irregular sensor series onto a 1-second grid.
///
/// Rolling-window statistics need wall-clock-exact windows regardless of how
/// irregularly a logger recorded. The grid runs from the first timestamp
/// floored to the minute to the last timestamp ceiled to the minute, one
/// slot per second. Slots that match an input timestamp keep its value
/// exactly; every other slot is "no reading" (`None`), never zero and never
/// interpolated.

use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::model::{Reading, TimeSeries};

/// A series on a uniform 1-second grid with explicit gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    start: NaiveDateTime,
    values: Vec<Option<f64>>,
}

impl ResampledSeries {
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.timestamp(self.values.len().saturating_sub(1))
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Timestamp of grid slot `index`.
    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::seconds(index as i64)
    }

    /// Sub-series covering `[from, to]`, clipped to the grid. `None` when the
    /// range does not overlap the grid.
    pub fn slice(&self, from: NaiveDateTime, to: NaiveDateTime) -> Option<ResampledSeries> {
        if self.values.is_empty() || to < from || to < self.start || from > self.end() {
            return None;
        }

        let lo = if from <= self.start {
            0
        } else {
            // First slot at or after `from`.
            let offset = from - self.start;
            let whole = offset.num_seconds();
            if offset == Duration::seconds(whole) { whole } else { whole + 1 }
        };
        let hi = (to - self.start).num_seconds().min(self.values.len() as i64 - 1);
        if lo > hi {
            return None;
        }

        Some(ResampledSeries {
            start: self.timestamp(lo as usize),
            values: self.values[lo as usize..=hi as usize].to_vec(),
        })
    }

    /// The recorded readings, in order, with their grid timestamps.
    pub fn valid_readings(&self) -> Vec<Reading> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|value| Reading::new(self.timestamp(i), value)))
            .collect()
    }
}

/// Floors a timestamp to the start of its minute.
pub fn floor_minute(t: NaiveDateTime) -> NaiveDateTime {
    t - Duration::seconds(t.second() as i64) - Duration::nanoseconds(t.nanosecond() as i64)
}

/// Ceils a timestamp to the next whole minute (unchanged if already whole).
pub fn ceil_minute(t: NaiveDateTime) -> NaiveDateTime {
    let floor = floor_minute(t);
    if floor == t { t } else { floor + Duration::minutes(1) }
}

/// Places a series on the 1-second grid. Returns `None` for an empty series.
///
/// Readings with sub-second timestamps do not land on a grid slot and are
/// dropped, as are non-finite values.
pub fn resample(series: &TimeSeries) -> Option<ResampledSeries> {
    let first = series.first()?.timestamp;
    let last = series.last()?.timestamp;

    let start = floor_minute(first);
    let end = ceil_minute(last);
    let len = (end - start).num_seconds() as usize + 1;

    let mut values = vec![None; len];
    let mut unaligned = 0usize;

    for reading in series.readings() {
        let offset = reading.timestamp - start;
        if offset != Duration::seconds(offset.num_seconds()) || !reading.value.is_finite() {
            unaligned += 1;
            continue;
        }
        values[offset.num_seconds() as usize] = Some(reading.value);
    }

    if unaligned > 0 {
        warn!(unaligned, "dropped readings that do not fall on the 1-second grid");
    }
    debug!(readings = series.len(), slots = len, "resampled series");

    Some(ResampledSeries { start, values })
}
