/// Input side: turning request payloads into typed series.
///
/// - `payload`: channel-keyed column JSON to `TimeSeries` / `FlowSeries`.
/// - `fixtures` (test only): representative payloads.

pub mod payload;

#[cfg(test)]
pub(crate) mod fixtures;
