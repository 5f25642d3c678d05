/// Core data types for the BMP performance statistics engine.
///
/// This module defines the shared domain model imported by all other modules:
/// raw readings, channel identifiers, the per-event and per-channel result
/// records, and the crate error type. It contains no analysis logic and no I/O.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// A single timestamped sensor reading (rain depth, flow rate or water depth).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// An ordered series of readings from one sensor channel.
///
/// Construction sorts by timestamp and collapses duplicate timestamps (the
/// last reading submitted for a timestamp wins), so timestamps are strictly
/// increasing. Sampling may still be irregular.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    readings: Vec<Reading>,
}

impl TimeSeries {
    pub fn new(mut readings: Vec<Reading>) -> Self {
        // Stable sort keeps submission order among equal timestamps.
        readings.sort_by_key(|r| r.timestamp);

        let mut deduped: Vec<Reading> = Vec::with_capacity(readings.len());
        for reading in readings {
            match deduped.last_mut() {
                Some(prev) if prev.timestamp == reading.timestamp => *prev = reading,
                _ => deduped.push(reading),
            }
        }

        Self { readings: deduped }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDateTime, f64)>,
    {
        Self::new(pairs.into_iter().map(|(t, v)| Reading::new(t, v)).collect())
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Flow monitoring channels at a BMP site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowChannel {
    Inflow1,
    Inflow2,
    Outflow,
    Bypass,
}

impl FlowChannel {
    pub const ALL: [FlowChannel; 4] = [
        FlowChannel::Inflow1,
        FlowChannel::Inflow2,
        FlowChannel::Outflow,
        FlowChannel::Bypass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowChannel::Inflow1 => "inflow1",
            FlowChannel::Inflow2 => "inflow2",
            FlowChannel::Outflow => "outflow",
            FlowChannel::Bypass => "bypass",
        }
    }
}

impl fmt::Display for FlowChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowChannel {
    type Err = BmpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowChannel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| BmpError::UnknownChannel(s.to_string()))
    }
}

/// Time basis of a flow rate (volume per second, per minute or per hour).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowUnit {
    #[default]
    PerSecond,
    PerMinute,
    PerHour,
}

impl FlowUnit {
    /// Length of the unit's time basis in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            FlowUnit::PerSecond => 1.0,
            FlowUnit::PerMinute => 60.0,
            FlowUnit::PerHour => 3600.0,
        }
    }
}

impl FromStr for FlowUnit {
    type Err = BmpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" => Ok(FlowUnit::PerSecond),
            "m" | "min" => Ok(FlowUnit::PerMinute),
            "h" | "hr" => Ok(FlowUnit::PerHour),
            other => Err(BmpError::UnknownTimeUnit(other.to_string())),
        }
    }
}

/// A flow channel's readings together with the time basis of its rates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSeries {
    pub series: TimeSeries,
    pub unit: FlowUnit,
}

// ---------------------------------------------------------------------------
// Rain events
// ---------------------------------------------------------------------------

/// Boundaries of one detected rain event, both ends at recorded tips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventWindow {
    pub first_rain: NaiveDateTime,
    pub last_rain: NaiveDateTime,
}

/// Peak rainfall intensity over one rolling window, scaled to depth per hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakIntensity {
    pub window_minutes: u32,
    pub intensity: Option<f64>,
}

/// Rainfall statistics for one published rain event.
///
/// Peak intensities are a list with one entry per configured window, in
/// configuration order, rather than fixed `peak_intensity_5m`-style fields:
///
/// ```text
/// "peak_intensities": [{"window_minutes": 5, "intensity": 6.096}, ...]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainEvent {
    pub first_rain: NaiveDateTime,
    pub last_rain: NaiveDateTime,
    pub total_depth: f64,
    pub duration_hours: f64,
    pub avg_intensity: Option<f64>,
    pub peak_intensities: Vec<PeakIntensity>,
    pub antecedent_dry_hours: Option<f64>,
}

impl RainEvent {
    pub fn window(&self) -> EventWindow {
        EventWindow {
            first_rain: self.first_rain,
            last_rain: self.last_rain,
        }
    }
}

// ---------------------------------------------------------------------------
// Flow statistics and balance
// ---------------------------------------------------------------------------

/// Runoff statistics for one flow channel over one interval.
///
/// Every statistic is `None` when the interval holds no readings.
/// `runoff_volume` is rate × seconds whatever the channel's `time_unit`;
/// divide by `time_unit.seconds()` for the rate's own volume unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowChannelStats {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_unit: FlowUnit,
    pub runoff_volume: Option<f64>,
    pub runoff_duration_hours: Option<f64>,
    pub peak_flow_rate: Option<f64>,
}

/// Which percent-change formula applies to the set of channels present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceFormula {
    /// {inflow1, outflow}
    InflowOutflow,
    /// {inflow1, bypass, outflow}
    InflowBypassOutflow,
    /// {inflow1, inflow2, bypass, outflow}
    TwoInflowsBypassOutflow,
    /// Any other combination, including two inflows without a bypass.
    Unsupported { channels: Vec<FlowChannel> },
}

/// Percent reduction from combined inflow to outflow, one entry per aligned
/// interval (a single entry in whole-series mode).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceResult {
    pub formula: BalanceFormula,
    pub percent_change_volume: Option<Vec<Option<f64>>>,
    pub percent_change_flow_rate: Option<Vec<Option<f64>>>,
}

// ---------------------------------------------------------------------------
// Infiltration
// ---------------------------------------------------------------------------

/// Fitted parameters of `depth(t) = y0·exp(−k·t) + c`, t in seconds from the
/// window start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecayParams {
    pub y0: f64,
    /// Decay constant per second.
    pub k: f64,
    pub c: f64,
}

impl DecayParams {
    pub fn evaluate(&self, elapsed_s: f64) -> f64 {
        self.y0 * (-self.k * elapsed_s).exp() + self.c
    }
}

/// Winning decay-fit window for one piezometer channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecayFitResult {
    pub window_time: Vec<NaiveDateTime>,
    pub window_depth: Vec<f64>,
    pub params: DecayParams,
    pub r_squared: f64,
    pub k_per_hour: f64,
    pub infiltration_rate: f64,
    pub window_size: usize,
    pub window_duration_hours: f64,
    pub average_depth: f64,
    pub extended_time: Vec<NaiveDateTime>,
    pub extended_fit: Vec<f64>,
}

/// How the sliding-window search ended for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Fitted,
    NoAcceptableFit,
    BudgetExhausted,
}

/// Infiltration outcome for one channel; `fit` is present only when fitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelFit {
    pub status: FitStatus,
    pub fit: Option<DecayFitResult>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading payloads and configuration.
///
/// The analysis functions themselves never fail: missing data shows up as
/// empty collections or `None` fields.
#[derive(Error, Debug)]
pub enum BmpError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown flow time unit: {0}")]
    UnknownTimeUnit(String),

    #[error("Unparseable timestamp: {0}")]
    Timestamp(String),

    #[error("Column length mismatch in {channel}: {datetimes} timestamps, {values} values")]
    ColumnLength {
        channel: String,
        datetimes: usize,
        values: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for loaders and configuration.
pub type BmpResult<T> = Result<T, BmpError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
