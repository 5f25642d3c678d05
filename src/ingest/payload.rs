/// Request payload parsing.
///
/// A payload is a JSON object keyed by channel. Each channel is
/// column-oriented, the shape a dataframe serialises to:
///
/// ```text
/// {
///   "rain":    { "datetime": [...], "rain": [...] },
///   "inflow1": { "datetime": [...], "flow": [...], "time_unit": "s" },
///   "outflow": { "datetime": {"0": ..., "1": ...}, "flow": {"0": ..., "1": ...}, "time_unit": ["s", "s"] }
/// }
/// ```
///
/// Columns may be plain arrays or index maps (`{"0": v, "1": v}`), ordered
/// by numeric index. Timestamps are ISO-8601 strings or epoch
/// milliseconds; any UTC offset is dropped and the wall-clock time kept.
/// Null values mean "no reading" and are skipped.
///
/// Infiltration payloads use arbitrary channel names, each with a `depth`
/// column.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::model::{BmpError, BmpResult, FlowChannel, FlowSeries, FlowUnit, Reading, TimeSeries};

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Column<T> {
    List(Vec<T>),
    Indexed(BTreeMap<String, T>),
}

impl<T> Column<T> {
    fn into_vec(self, channel: &str) -> BmpResult<Vec<T>> {
        match self {
            Column::List(values) => Ok(values),
            Column::Indexed(map) => {
                let mut entries = map
                    .into_iter()
                    .map(|(key, value)| {
                        key.parse::<usize>().map(|i| (i, value)).map_err(|_| {
                            BmpError::InvalidPayload(format!("{}: non-numeric column index {:?}", channel, key))
                        })
                    })
                    .collect::<BmpResult<Vec<_>>>()?;
                entries.sort_by_key(|(i, _)| *i);
                Ok(entries.into_iter().map(|(_, value)| value).collect())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    EpochMillis(i64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimeUnit {
    Single(String),
    PerRow(Column<String>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChannel {
    datetime: Column<RawTimestamp>,
    rain: Option<Column<Option<f64>>>,
    flow: Option<Column<Option<f64>>>,
    depth: Option<Column<Option<f64>>>,
    time_unit: Option<RawTimeUnit>,
}

type RawPayload = BTreeMap<String, RawChannel>;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Parses a payload timestamp into wall-clock time.
pub fn parse_timestamp(text: &str) -> BmpResult<NaiveDateTime> {
    let text = text.trim();

    for format in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(t);
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.naive_local());
    }
    for format in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(text, format) {
            return Ok(t.naive_local());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight);
    }

    Err(BmpError::Timestamp(text.to_string()))
}

fn resolve_timestamp(raw: RawTimestamp) -> BmpResult<NaiveDateTime> {
    match raw {
        RawTimestamp::Text(text) => parse_timestamp(&text),
        RawTimestamp::EpochMillis(ms) => DateTime::from_timestamp_millis(ms)
            .map(|t| t.naive_utc())
            .ok_or_else(|| BmpError::Timestamp(ms.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Channel conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueColumn {
    Rain,
    Flow,
    Depth,
}

impl ValueColumn {
    fn name(self) -> &'static str {
        match self {
            ValueColumn::Rain => "rain",
            ValueColumn::Flow => "flow",
            ValueColumn::Depth => "depth",
        }
    }
}

impl RawChannel {
    /// Builds the channel's series from its `datetime` and value columns.
    /// Other value columns must be absent.
    fn into_series(self, channel: &str, expected: ValueColumn) -> BmpResult<TimeSeries> {
        let columns = [
            (ValueColumn::Rain, self.rain),
            (ValueColumn::Flow, self.flow),
            (ValueColumn::Depth, self.depth),
        ];

        let mut values = None;
        for (kind, column) in columns {
            match (kind == expected, column) {
                (true, Some(column)) => values = Some(column.into_vec(channel)?),
                (false, Some(_)) => {
                    return Err(BmpError::InvalidPayload(format!(
                        "{}: unexpected `{}` column",
                        channel,
                        kind.name()
                    )));
                }
                _ => {}
            }
        }
        let values = values.ok_or_else(|| {
            BmpError::InvalidPayload(format!("{}: missing `{}` column", channel, expected.name()))
        })?;

        let datetimes = self.datetime.into_vec(channel)?;
        if datetimes.len() != values.len() {
            return Err(BmpError::ColumnLength {
                channel: channel.to_string(),
                datetimes: datetimes.len(),
                values: values.len(),
            });
        }

        let mut readings = Vec::with_capacity(values.len());
        for (raw, value) in datetimes.into_iter().zip(values) {
            let timestamp = resolve_timestamp(raw)?;
            if let Some(value) = value {
                readings.push(Reading::new(timestamp, value));
            }
        }

        debug!(channel, readings = readings.len(), "parsed channel");
        Ok(TimeSeries::new(readings))
    }

    fn take_time_unit(&mut self, channel: &str) -> BmpResult<FlowUnit> {
        let first = match self.time_unit.take() {
            None => return Ok(FlowUnit::default()),
            Some(RawTimeUnit::Single(unit)) => Some(unit),
            Some(RawTimeUnit::PerRow(column)) => column.into_vec(channel)?.into_iter().next(),
        };
        first.map_or(Ok(FlowUnit::default()), |unit| unit.parse())
    }
}

fn flow_series(channel: &str, mut raw: RawChannel) -> BmpResult<FlowSeries> {
    let unit = raw.take_time_unit(channel)?;
    let series = raw.into_series(channel, ValueColumn::Flow)?;
    Ok(FlowSeries { series, unit })
}

fn reject_time_unit(channel: &str, raw: &RawChannel) -> BmpResult<()> {
    match raw.time_unit {
        Some(_) => Err(BmpError::InvalidPayload(format!("{}: unexpected `time_unit` column", channel))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Payload entry points
// ---------------------------------------------------------------------------

/// Rain gauge plus flow channels, for combined event analysis.
#[derive(Debug, Clone, Default)]
pub struct RainflowPayload {
    pub rain: TimeSeries,
    pub flows: BTreeMap<FlowChannel, FlowSeries>,
}

fn parse_raw(json: &str) -> BmpResult<RawPayload> {
    let payload: RawPayload = serde_json::from_str(json)?;
    if payload.is_empty() {
        return Err(BmpError::InvalidPayload("payload has no channels".into()));
    }
    Ok(payload)
}

/// Splits a payload into its optional rain gauge and flow channels. Any
/// other channel name is rejected.
fn split_rain_and_flows(
    payload: RawPayload,
) -> BmpResult<(Option<TimeSeries>, BTreeMap<FlowChannel, FlowSeries>)> {
    let mut rain = None;
    let mut flows = BTreeMap::new();

    for (name, raw) in payload {
        if name == "rain" {
            reject_time_unit(&name, &raw)?;
            rain = Some(raw.into_series(&name, ValueColumn::Rain)?);
        } else {
            let channel: FlowChannel = name.parse()?;
            flows.insert(channel, flow_series(&name, raw)?);
        }
    }
    Ok((rain, flows))
}

/// Parses a rain-only payload.
pub fn parse_rain_payload(json: &str) -> BmpResult<TimeSeries> {
    let (rain, flows) = split_rain_and_flows(parse_raw(json)?)?;
    if let Some(channel) = flows.keys().next() {
        return Err(BmpError::UnknownChannel(channel.to_string()));
    }
    rain.ok_or_else(|| BmpError::InvalidPayload("missing `rain` channel".into()))
}

/// Parses a payload of flow channels only.
pub fn parse_flow_payload(json: &str) -> BmpResult<BTreeMap<FlowChannel, FlowSeries>> {
    let (rain, flows) = split_rain_and_flows(parse_raw(json)?)?;
    if rain.is_some() {
        return Err(BmpError::UnknownChannel("rain".into()));
    }
    Ok(flows)
}

/// Parses a payload with a rain gauge and any flow channels.
pub fn parse_rainflow_payload(json: &str) -> BmpResult<RainflowPayload> {
    let (rain, flows) = split_rain_and_flows(parse_raw(json)?)?;
    let rain = rain.ok_or_else(|| BmpError::InvalidPayload("missing `rain` channel".into()))?;
    Ok(RainflowPayload { rain, flows })
}

/// Parses a payload of named depth channels for infiltration fitting.
pub fn parse_depth_payload(json: &str) -> BmpResult<BTreeMap<String, TimeSeries>> {
    parse_raw(json)?
        .into_iter()
        .map(|(name, raw)| {
            reject_time_unit(&name, &raw)?;
            let series = raw.into_series(&name, ValueColumn::Depth)?;
            Ok((name, series))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = ts("2021-09-24 16:24:40");
        assert_eq!(parse_timestamp("2021-09-24 16:24:40").unwrap(), expected);
        assert_eq!(parse_timestamp("2021-09-24T16:24:40").unwrap(), expected);
        assert_eq!(parse_timestamp("2021-09-24T16:24:40.000").unwrap(), expected);
        assert_eq!(parse_timestamp("2021-09-24T16:24:40-05:00").unwrap(), expected, "offset dropped");
        assert_eq!(parse_timestamp("2021-09-24T16:24:40Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2021-09-24 16:24").unwrap(), ts("2021-09-24 16:24:00"));
        assert_eq!(parse_timestamp("2021-09-24").unwrap(), ts("2021-09-24 00:00:00"));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(parse_timestamp("yesterday"), Err(BmpError::Timestamp(_))));
    }

    #[test]
    fn test_rain_payload_drops_nulls() {
        let rain = parse_rain_payload(fixture_rain_json()).unwrap();
        assert_eq!(rain.len(), 5, "one null reading dropped");
        assert_eq!(rain.first().unwrap().timestamp, ts("2021-09-24 16:24:40"));
        assert_eq!(rain.first().unwrap().value, 0.508);
    }

    #[test]
    fn test_indexed_columns_follow_numeric_order() {
        let flows = parse_flow_payload(fixture_indexed_flow_json()).unwrap();
        let inflow = &flows[&FlowChannel::Inflow1];
        let values: Vec<f64> = inflow.series.readings().iter().map(|r| r.value).collect();
        // Keys "2" and "10" would sort the other way as strings.
        assert_eq!(values, vec![0.0, 1.0, 2.0, 1.5, 0.5, 0.25, 0.1, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(inflow.unit, FlowUnit::PerMinute);
    }

    #[test]
    fn test_epoch_millisecond_timestamps() {
        let json = r#"{"rain": {"datetime": [1632500680000, 1632500690000], "rain": [0.254, 0.254]}}"#;
        let rain = parse_rain_payload(json).unwrap();
        assert_eq!(rain.first().unwrap().timestamp, ts("2021-09-24 16:24:40"));
    }

    #[test]
    fn test_flow_payload_channels_and_units() {
        let flows = parse_flow_payload(fixture_flow_json()).unwrap();
        assert_eq!(flows.keys().copied().collect::<Vec<_>>(), vec![FlowChannel::Inflow1, FlowChannel::Outflow]);
        assert_eq!(flows[&FlowChannel::Inflow1].unit, FlowUnit::PerSecond);
        assert_eq!(flows[&FlowChannel::Outflow].unit, FlowUnit::PerSecond, "per-row unit column");
    }

    #[test]
    fn test_rainflow_payload_requires_rain() {
        let err = parse_rainflow_payload(fixture_flow_json()).unwrap_err();
        assert!(matches!(err, BmpError::InvalidPayload(_)), "got {:?}", err);

        let payload = parse_rainflow_payload(fixture_rainflow_json()).unwrap();
        assert!(!payload.rain.is_empty());
        assert_eq!(payload.flows.len(), 2);
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let json = r#"{"overflow": {"datetime": ["2021-09-24 16:00:00"], "flow": [1.0], "time_unit": "s"}}"#;
        assert!(matches!(parse_flow_payload(json), Err(BmpError::UnknownChannel(name)) if name == "overflow"));
    }

    #[test]
    fn test_rain_in_flow_payload_is_rejected() {
        let err = parse_flow_payload(fixture_rainflow_json()).unwrap_err();
        assert!(matches!(err, BmpError::UnknownChannel(_)));
    }

    #[test]
    fn test_column_length_mismatch() {
        let json = r#"{"rain": {"datetime": ["2021-09-24 16:00:00", "2021-09-24 16:00:10"], "rain": [1.0]}}"#;
        match parse_rain_payload(json) {
            Err(BmpError::ColumnLength { channel, datetimes, values }) => {
                assert_eq!(channel, "rain");
                assert_eq!((datetimes, values), (2, 1));
            }
            other => panic!("expected ColumnLength, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_key_and_wrong_value_column() {
        let extra = r#"{"rain": {"datetime": [], "rain": [], "gauge_id": "G1"}}"#;
        assert!(matches!(parse_rain_payload(extra), Err(BmpError::Json(_))));

        let wrong = r#"{"inflow1": {"datetime": [], "rain": [], "time_unit": "s"}}"#;
        assert!(matches!(parse_flow_payload(wrong), Err(BmpError::InvalidPayload(_))));
    }

    #[test]
    fn test_bad_time_unit() {
        let json = r#"{"inflow1": {"datetime": ["2021-09-24 16:00:00"], "flow": [1.0], "time_unit": "fortnight"}}"#;
        assert!(matches!(parse_flow_payload(json), Err(BmpError::UnknownTimeUnit(_))));
    }

    #[test]
    fn test_depth_payload_keeps_channel_names() {
        let depths = parse_depth_payload(fixture_depth_json()).unwrap();
        assert_eq!(depths.keys().cloned().collect::<Vec<_>>(), vec!["pz1".to_string(), "pz2".to_string()]);
        assert_eq!(depths["pz1"].len(), 4);
    }
}
