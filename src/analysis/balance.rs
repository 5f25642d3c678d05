/// Inflow/outflow balance: percent reduction from combined inflow to outflow.
///
/// The formula depends on which flow channels the site reports:
///
/// | channels                              | volume | peak rate |
/// |---------------------------------------|--------|-----------|
/// | inflow1, outflow                      | yes    | yes       |
/// | inflow1, bypass, outflow              | yes    | no        |
/// | inflow1, inflow2, bypass, outflow     | yes    | no        |
///
/// Anything else, notably two inflows with no bypass, is reported as an
/// unsupported combination with no values.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::model::{BalanceFormula, BalanceResult, FlowChannel, FlowChannelStats};

/// Picks the balance formula for a set of flow channels.
pub fn select_formula(channels: &BTreeSet<FlowChannel>) -> BalanceFormula {
    use FlowChannel::*;

    let has = |c: FlowChannel| channels.contains(&c);
    match (channels.len(), has(Inflow1), has(Inflow2), has(Bypass), has(Outflow)) {
        (2, true, false, false, true) => BalanceFormula::InflowOutflow,
        (3, true, false, true, true) => BalanceFormula::InflowBypassOutflow,
        (4, true, true, true, true) => BalanceFormula::TwoInflowsBypassOutflow,
        _ => BalanceFormula::Unsupported {
            channels: channels.iter().copied().collect(),
        },
    }
}

/// `(inflow − outflow) / inflow × 100`; undefined when not finite (for
/// example zero combined inflow).
pub fn percent_change(combined_inflow: f64, outflow: f64) -> Option<f64> {
    let change = (combined_inflow - outflow) / combined_inflow * 100.0;
    change.is_finite().then_some(change)
}

/// Applies `percent_change` element-wise over aligned per-interval values.
/// The result is as long as the shortest input; an interval with any
/// missing input has no value.
fn elementwise(inflows: &[Vec<Option<f64>>], outflow: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..outflow.len())
        .filter(|&i| inflows.iter().all(|column| i < column.len()))
        .map(|i| {
            let combined = inflows
                .iter()
                .map(|column| column[i])
                .sum::<Option<f64>>()?;
            percent_change(combined, outflow[i]?)
        })
        .collect()
}

fn column(
    stats: &BTreeMap<FlowChannel, Vec<FlowChannelStats>>,
    channel: FlowChannel,
    field: fn(&FlowChannelStats) -> Option<f64>,
) -> Vec<Option<f64>> {
    stats
        .get(&channel)
        .map(|entries| entries.iter().map(field).collect())
        .unwrap_or_default()
}

/// Computes the balance for per-channel statistics aligned by interval
/// (one entry per rain event, or a single whole-record entry).
pub fn compute_balance(stats: &BTreeMap<FlowChannel, Vec<FlowChannelStats>>) -> BalanceResult {
    let channels: BTreeSet<FlowChannel> = stats.keys().copied().collect();
    let formula = select_formula(&channels);

    let volume = |c| column(stats, c, |s| s.runoff_volume);
    let peak = |c| column(stats, c, |s| s.peak_flow_rate);

    let (percent_change_volume, percent_change_flow_rate) = match &formula {
        BalanceFormula::InflowOutflow => (
            Some(elementwise(&[volume(FlowChannel::Inflow1)], &volume(FlowChannel::Outflow))),
            Some(elementwise(&[peak(FlowChannel::Inflow1)], &peak(FlowChannel::Outflow))),
        ),
        BalanceFormula::InflowBypassOutflow => (
            Some(elementwise(
                &[volume(FlowChannel::Inflow1), volume(FlowChannel::Bypass)],
                &volume(FlowChannel::Outflow),
            )),
            None,
        ),
        BalanceFormula::TwoInflowsBypassOutflow => (
            Some(elementwise(
                &[
                    volume(FlowChannel::Inflow1),
                    volume(FlowChannel::Inflow2),
                    volume(FlowChannel::Bypass),
                ],
                &volume(FlowChannel::Outflow),
            )),
            None,
        ),
        BalanceFormula::Unsupported { channels } => {
            if channels.len() > 1 {
                warn!(?channels, "no percent-change formula for this channel combination");
            }
            (None, None)
        }
    };

    BalanceResult {
        formula,
        percent_change_volume,
        percent_change_flow_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlowUnit;
    use chrono::{NaiveDate, NaiveDateTime};

    fn t() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn stats(volume: f64, peak: f64) -> FlowChannelStats {
        FlowChannelStats {
            start: t(),
            end: t(),
            time_unit: FlowUnit::PerSecond,
            runoff_volume: Some(volume),
            runoff_duration_hours: Some(1.0),
            peak_flow_rate: Some(peak),
        }
    }

    fn site(entries: &[(FlowChannel, Vec<FlowChannelStats>)]) -> BTreeMap<FlowChannel, Vec<FlowChannelStats>> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn test_inflow_outflow_volume_and_peak() {
        let result = compute_balance(&site(&[
            (FlowChannel::Inflow1, vec![stats(10.0, 4.0)]),
            (FlowChannel::Outflow, vec![stats(8.0, 1.0)]),
        ]));
        assert_eq!(result.formula, BalanceFormula::InflowOutflow);
        assert_eq!(result.percent_change_volume, Some(vec![Some(20.0)]));
        assert_eq!(result.percent_change_flow_rate, Some(vec![Some(75.0)]));
    }

    #[test]
    fn test_bypass_adds_to_inflow() {
        let result = compute_balance(&site(&[
            (FlowChannel::Inflow1, vec![stats(10.0, 1.0)]),
            (FlowChannel::Bypass, vec![stats(5.0, 1.0)]),
            (FlowChannel::Outflow, vec![stats(12.0, 1.0)]),
        ]));
        assert_eq!(result.formula, BalanceFormula::InflowBypassOutflow);
        assert_eq!(result.percent_change_volume, Some(vec![Some(20.0)]));
        assert_eq!(result.percent_change_flow_rate, None, "peak rate not computed with bypass");
    }

    #[test]
    fn test_two_inflows_with_bypass() {
        let result = compute_balance(&site(&[
            (FlowChannel::Inflow1, vec![stats(10.0, 1.0), stats(4.0, 1.0)]),
            (FlowChannel::Inflow2, vec![stats(6.0, 1.0), stats(4.0, 1.0)]),
            (FlowChannel::Bypass, vec![stats(4.0, 1.0), stats(2.0, 1.0)]),
            (FlowChannel::Outflow, vec![stats(5.0, 1.0), stats(10.0, 1.0)]),
        ]));
        assert_eq!(result.formula, BalanceFormula::TwoInflowsBypassOutflow);
        assert_eq!(result.percent_change_volume, Some(vec![Some(75.0), Some(0.0)]));
    }

    #[test]
    fn test_two_inflows_without_bypass_is_unsupported() {
        let result = compute_balance(&site(&[
            (FlowChannel::Inflow1, vec![stats(10.0, 1.0)]),
            (FlowChannel::Inflow2, vec![stats(6.0, 1.0)]),
            (FlowChannel::Outflow, vec![stats(5.0, 1.0)]),
        ]));
        assert_eq!(
            result.formula,
            BalanceFormula::Unsupported {
                channels: vec![FlowChannel::Inflow1, FlowChannel::Inflow2, FlowChannel::Outflow]
            }
        );
        assert_eq!(result.percent_change_volume, None);
        assert_eq!(result.percent_change_flow_rate, None);
    }

    #[test]
    fn test_zero_inflow_is_undefined_not_infinite() {
        let result = compute_balance(&site(&[
            (FlowChannel::Inflow1, vec![stats(0.0, 0.0)]),
            (FlowChannel::Outflow, vec![stats(3.0, 0.0)]),
        ]));
        assert_eq!(result.percent_change_volume, Some(vec![None]));
        assert_eq!(result.percent_change_flow_rate, Some(vec![None]));
    }

    #[test]
    fn test_missing_interval_value_propagates_as_none() {
        let mut empty = stats(0.0, 0.0);
        empty.runoff_volume = None;
        let result = compute_balance(&site(&[
            (FlowChannel::Inflow1, vec![stats(10.0, 1.0), empty]),
            (FlowChannel::Outflow, vec![stats(5.0, 1.0), stats(5.0, 1.0)]),
        ]));
        assert_eq!(result.percent_change_volume, Some(vec![Some(50.0), None]));
    }

    #[test]
    fn test_percent_change_formula() {
        assert_eq!(percent_change(15.0, 12.0), Some(20.0));
        assert_eq!(percent_change(0.0, 0.0), None);
        assert_eq!(percent_change(10.0, 15.0), Some(-50.0));
    }
}
