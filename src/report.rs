/// Report assembly: one entry point per analysis route.
///
/// Each function takes already-parsed series plus the immutable
/// configuration and returns a serialisable report. Nothing here fails;
/// empty or unusable input shows up as empty collections and `null`s.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::balance::compute_balance;
use crate::analysis::flow::{flow_statistics, windowed_flow_statistics};
use crate::analysis::infiltration::{FitBudget, fit_infiltration};
use crate::analysis::rain_events::segment_rain_events;
use crate::analysis::rainfall::rainfall_statistics;
use crate::analysis::resample::{ResampledSeries, resample};
use crate::config::AnalysisConfig;
use crate::model::{BalanceResult, ChannelFit, FitStatus, FlowChannel, FlowChannelStats, FlowSeries, RainEvent, TimeSeries};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Rain events in time order. Each event's peak intensities serialise as a
/// `peak_intensities` list keyed by `window_minutes`, one entry per
/// `rain.intensity_windows_minutes` value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RainReport {
    pub events: Vec<RainEvent>,
}

/// Whole-record statistics per flow channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub channels: BTreeMap<FlowChannel, FlowChannelStats>,
    pub balance: BalanceResult,
}

/// Rain events with per-event flow statistics; every flow vector is
/// aligned with `events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainflowReport {
    pub events: Vec<RainEvent>,
    pub channels: BTreeMap<FlowChannel, Vec<FlowChannelStats>>,
    pub balance: BalanceResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InfiltrationReport {
    pub channels: BTreeMap<String, ChannelFit>,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn rain_events(rain: &TimeSeries, config: &AnalysisConfig) -> Vec<RainEvent> {
    if rain.is_empty() {
        warn!("rain gauge has no readings");
        return Vec::new();
    }
    resample(rain)
        .map(|grid| {
            let windows = segment_rain_events(&grid, config.rain.hour_window_hours);
            rainfall_statistics(&grid, &windows, &config.rain.intensity_windows_minutes)
        })
        .unwrap_or_default()
}

/// Resamples every flow channel, dropping channels with no readings.
fn resample_flows(flows: &BTreeMap<FlowChannel, FlowSeries>) -> BTreeMap<FlowChannel, (ResampledSeries, &FlowSeries)> {
    flows
        .iter()
        .filter_map(|(&channel, flow)| match resample(&flow.series) {
            Some(grid) => Some((channel, (grid, flow))),
            None => {
                warn!(%channel, "flow channel has no readings, skipped");
                None
            }
        })
        .collect()
}

pub fn rain_report(rain: &TimeSeries, config: &AnalysisConfig) -> RainReport {
    let events = rain_events(rain, config);

    info!(events = events.len(), "rain report");
    RainReport { events }
}

pub fn flow_report(flows: &BTreeMap<FlowChannel, FlowSeries>, config: &AnalysisConfig) -> FlowReport {
    let channels: BTreeMap<FlowChannel, FlowChannelStats> = resample_flows(flows)
        .into_iter()
        .map(|(channel, (grid, flow))| {
            (channel, flow_statistics(&grid, flow.unit, config.flow.peak_window_minutes))
        })
        .collect();

    let per_interval = channels
        .iter()
        .map(|(&channel, stats)| (channel, vec![stats.clone()]))
        .collect();
    let balance = compute_balance(&per_interval);

    info!(channels = channels.len(), "flow report");
    FlowReport { channels, balance }
}

/// Rain events from the gauge, then flow statistics over
/// `[first_rain, last_rain + drain_interval]` for each event.
pub fn rainflow_report(
    rain: &TimeSeries,
    flows: &BTreeMap<FlowChannel, FlowSeries>,
    config: &AnalysisConfig,
) -> RainflowReport {
    let events = rain_events(rain, config);
    let windows: Vec<_> = events.iter().map(RainEvent::window).collect();

    let channels: BTreeMap<FlowChannel, Vec<FlowChannelStats>> = resample_flows(flows)
        .into_iter()
        .map(|(channel, (grid, flow))| {
            let stats = windowed_flow_statistics(
                &grid,
                flow.unit,
                &windows,
                config.flow.drain_interval_hours,
                config.flow.peak_window_minutes,
            );
            (channel, stats)
        })
        .collect();
    let balance = compute_balance(&channels);

    info!(events = events.len(), channels = channels.len(), "rainflow report");
    RainflowReport {
        events,
        channels,
        balance,
    }
}

/// Fits every depth channel. Channels are independent: one channel running
/// out of budget or finding no fit leaves the others untouched.
pub fn infiltration_report(
    depths: &BTreeMap<String, TimeSeries>,
    config: &AnalysisConfig,
    budget: &FitBudget,
) -> InfiltrationReport {
    let channels: BTreeMap<String, ChannelFit> = depths
        .iter()
        .map(|(name, series)| {
            let fit = fit_infiltration(series, &config.infiltration, budget);
            if fit.status != FitStatus::Fitted {
                warn!(channel = %name, status = ?fit.status, "no infiltration fit");
            }
            (name.clone(), fit)
        })
        .collect();

    let fitted = channels
        .values()
        .filter(|fit| fit.status == FitStatus::Fitted)
        .count();
    info!(channels = channels.len(), fitted, "infiltration report");

    InfiltrationReport { channels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use crate::ingest::payload::{parse_flow_payload, parse_rain_payload, parse_rainflow_payload};
    use crate::model::BalanceFormula;

    #[test]
    fn test_rain_report_single_burst() {
        let rain = parse_rain_payload(fixture_rain_json()).unwrap();
        let report = rain_report(&rain, &AnalysisConfig::default());

        assert_eq!(report.events.len(), 1);
        let event = &report.events[0];
        assert!((event.total_depth - 3.556).abs() < 1e-9, "got {}", event.total_depth);
        assert!((event.duration_hours - 1220.0 / 3600.0).abs() < 1e-12);
        assert_eq!(event.antecedent_dry_hours, None);
    }

    #[test]
    fn test_empty_rain_gives_no_events() {
        let report = rain_report(&TimeSeries::default(), &AnalysisConfig::default());
        assert!(report.events.is_empty());
    }

    #[test]
    fn test_flow_report_inflow_outflow() {
        let flows = parse_flow_payload(fixture_flow_json()).unwrap();
        let report = flow_report(&flows, &AnalysisConfig::default());

        let inflow = &report.channels[&FlowChannel::Inflow1];
        let outflow = &report.channels[&FlowChannel::Outflow];
        assert_eq!(inflow.runoff_volume, Some(7200.0));
        assert_eq!(outflow.runoff_volume, Some(3900.0));
        assert_eq!(inflow.runoff_duration_hours, Some(1.0));
        assert_eq!(inflow.peak_flow_rate, Some(4.0));
        assert_eq!(outflow.peak_flow_rate, Some(2.0));

        assert_eq!(report.balance.formula, BalanceFormula::InflowOutflow);
        let volume = report.balance.percent_change_volume.as_ref().unwrap();
        assert!((volume[0].unwrap() - 3300.0 / 72.0).abs() < 1e-9);
        assert_eq!(report.balance.percent_change_flow_rate, Some(vec![Some(50.0)]));
    }

    #[test]
    fn test_rainflow_report_aligns_flows_with_events() {
        let payload = parse_rainflow_payload(fixture_rainflow_json()).unwrap();
        let report = rainflow_report(&payload.rain, &payload.flows, &AnalysisConfig::default());

        assert_eq!(report.events.len(), 2);
        for stats in report.channels.values() {
            assert_eq!(stats.len(), report.events.len());
        }

        let inflow = &report.channels[&FlowChannel::Inflow1];
        assert_eq!(inflow[0].runoff_volume, Some(7200.0));
        assert_eq!(inflow[1].runoff_volume, None, "no flow logged during the second storm");

        let volume = report.balance.percent_change_volume.as_ref().unwrap();
        assert_eq!(volume.len(), 2);
        assert_eq!(volume[1], None);
    }

    #[test]
    fn test_report_serialises_nulls_and_plain_timestamps() {
        let payload = parse_rainflow_payload(fixture_rainflow_json()).unwrap();
        let report = rainflow_report(&payload.rain, &payload.flows, &AnalysisConfig::default());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["events"][0]["first_rain"], "2021-09-24T16:00:00");
        assert!(json["events"][0]["antecedent_dry_hours"].is_null());
        assert!(json["channels"]["inflow1"][1]["peak_flow_rate"].is_null());
        assert_eq!(json["balance"]["formula"]["kind"], "inflow_outflow");
        assert_eq!(json["channels"]["inflow1"][0]["time_unit"], "per_second");
    }

    #[test]
    fn test_peak_intensities_serialise_as_window_list() {
        let rain = parse_rain_payload(fixture_rain_json()).unwrap();
        let report = rain_report(&rain, &AnalysisConfig::default());
        let json = serde_json::to_value(&report).unwrap();

        let peaks = json["events"][0]["peak_intensities"].as_array().unwrap();
        let windows: Vec<_> = peaks.iter().map(|p| p["window_minutes"].as_u64().unwrap()).collect();
        assert_eq!(windows, vec![5, 10, 60]);
        assert!(peaks.iter().all(|p| p["intensity"].is_number()));
        assert!(json["events"][0].get("peak_intensity_5m").is_none());
    }

    #[test]
    fn test_infiltration_report_covers_every_channel() {
        let depths: BTreeMap<String, TimeSeries> = [
            ("pz1".to_string(), TimeSeries::default()),
            ("pz2".to_string(), TimeSeries::default()),
        ]
        .into_iter()
        .collect();
        let report = infiltration_report(&depths, &AnalysisConfig::default(), &FitBudget::unlimited());

        assert_eq!(report.channels.len(), 2);
        assert!(report.channels.values().all(|fit| fit.status == FitStatus::NoAcceptableFit));
    }
}
