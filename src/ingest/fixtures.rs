/// Test fixtures: representative request payloads.
///
/// Channel-keyed, column-oriented JSON as produced by a dataframe
/// `to_dict()` / `to_json()` on the logger export. Rain is a tipping-bucket
/// gauge (0.254 mm per tip); flows are in volume per second unless the
/// fixture says otherwise.

/// Rain gauge burst with one null row, which the loader drops.
pub(crate) fn fixture_rain_json() -> &'static str {
    r#"{
      "rain": {
        "datetime": ["2021-09-24 16:24:30", "2021-09-24 16:24:40", "2021-09-24 16:24:50",
                     "2021-09-24 16:25:00", "2021-09-24 16:30:00", "2021-09-24 16:45:00"],
        "rain": [null, 0.508, 1.524, 1.016, 0.254, 0.254]
      }
    }"#
}

/// Inflow and outflow over one hour at 10-minute logging. Outflow carries
/// its time unit as a per-row column.
pub(crate) fn fixture_flow_json() -> &'static str {
    r#"{
      "inflow1": { "datetime": ["2021-09-24 16:00:00", "2021-09-24 16:10:00", "2021-09-24 16:20:00", "2021-09-24 16:30:00", "2021-09-24 16:40:00", "2021-09-24 16:50:00", "2021-09-24 17:00:00"], "flow": [0, 2, 4, 3, 2, 1, 0], "time_unit": "s" },
      "outflow": { "datetime": ["2021-09-24 16:00:00", "2021-09-24 16:10:00", "2021-09-24 16:20:00", "2021-09-24 16:30:00", "2021-09-24 16:40:00", "2021-09-24 16:50:00", "2021-09-24 17:00:00"], "flow": [0, 1, 2, 2, 1, 0.5, 0], "time_unit": ["s", "s", "s", "s", "s", "s", "s"] }
    }"#
}

/// Pandas index-map columns (`{"0": .., "1": ..}`). Keys are emitted in
/// string order, so "10" comes before "2".
pub(crate) fn fixture_indexed_flow_json() -> &'static str {
    r#"{
      "inflow1": { "datetime": {"0": "2021-09-24 16:00:00", "1": "2021-09-24 16:01:00", "10": "2021-09-24 16:10:00", "2": "2021-09-24 16:02:00", "3": "2021-09-24 16:03:00", "4": "2021-09-24 16:04:00", "5": "2021-09-24 16:05:00", "6": "2021-09-24 16:06:00", "7": "2021-09-24 16:07:00", "8": "2021-09-24 16:08:00", "9": "2021-09-24 16:09:00"}, "flow": {"0": 0, "1": 1, "10": 0, "2": 2, "3": 1.5, "4": 0.5, "5": 0.25, "6": 0.1, "7": 0, "8": 0, "9": 0}, "time_unit": {"0": "min", "1": "min", "10": "min", "2": "min", "3": "min", "4": "min", "5": "min", "6": "min", "7": "min", "8": "min", "9": "min"} }
    }"#
}

/// Rain gauge plus the inflow/outflow pair from `fixture_flow_json`.
pub(crate) fn fixture_rainflow_json() -> &'static str {
    r#"{
      "rain": { "datetime": ["2021-09-24 16:00:00", "2021-09-24 16:10:00", "2021-09-24 16:20:00", "2021-09-24 16:30:00", "2021-09-24 16:40:00", "2021-09-25 12:00:00", "2021-09-25 12:15:00", "2021-09-25 12:30:00", "2021-09-25 12:45:00", "2021-09-25 13:00:00"], "rain": [0.254, 0.254, 0.254, 0.254, 0.254, 0.254, 0.254, 0.254, 0.254, 0.254] },
      "inflow1": { "datetime": ["2021-09-24 16:00:00", "2021-09-24 16:10:00", "2021-09-24 16:20:00", "2021-09-24 16:30:00", "2021-09-24 16:40:00", "2021-09-24 16:50:00", "2021-09-24 17:00:00"], "flow": [0, 2, 4, 3, 2, 1, 0], "time_unit": "s" },
      "outflow": { "datetime": ["2021-09-24 16:00:00", "2021-09-24 16:10:00", "2021-09-24 16:20:00", "2021-09-24 16:30:00", "2021-09-24 16:40:00", "2021-09-24 16:50:00", "2021-09-24 17:00:00"], "flow": [0, 1, 2, 2, 1, 0.5, 0], "time_unit": ["s", "s", "s", "s", "s", "s", "s"] }
    }"#
}

/// Two piezometers, ISO timestamps with a `T` separator.
pub(crate) fn fixture_depth_json() -> &'static str {
    r#"{
      "pz1": {
        "datetime": ["2021-09-25T00:00:00", "2021-09-25T00:15:00", "2021-09-25T00:30:00", "2021-09-25T00:45:00"],
        "depth": [1.20, 1.05, 0.93, 0.84]
      },
      "pz2": {
        "datetime": ["2021-09-25T00:00:00", "2021-09-25T00:15:00", "2021-09-25T00:30:00"],
        "depth": [0.61, null, 0.55]
      }
    }"#
}
