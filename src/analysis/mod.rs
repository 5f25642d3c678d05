/// Core analytics for BMP monitoring records.
///
/// Submodules:
/// - `rolling`: time-keyed sliding-window sums and means.
/// - `resample`: one-second grid alignment shared by every stage.
/// - `rain_events`: rain event boundaries from rolling-sum edges.
/// - `rainfall`: per-event depth, intensity, and antecedent dry period.
/// - `flow`: runoff volume, duration, and peak flow rate.
/// - `balance`: inflow/outflow percent change.
/// - `optimizer`: least-squares solver interface.
/// - `infiltration`: adaptive-window exponential decay fits on depth.

pub mod balance;
pub mod flow;
pub mod infiltration;
pub mod optimizer;
pub mod rain_events;
pub mod rainfall;
pub mod resample;
pub mod rolling;
