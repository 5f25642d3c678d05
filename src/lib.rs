/// bmp_stats: rainfall, runoff and infiltration statistics for stormwater
/// BMP monitoring records.
///
/// # Module structure
///
/// ```text
/// bmp_stats
/// ├── model       — shared data types (TimeSeries, RainEvent, FlowChannelStats, BmpError, …)
/// ├── config      — analysis parameter loader (bmp.toml)
/// ├── ingest
/// │   ├── payload — channel-keyed column JSON → typed series
/// │   └── fixtures (test only) — representative request payloads
/// ├── analysis
/// │   ├── rolling      — time-keyed sliding-window accumulator
/// │   ├── resample     — one-second grid alignment
/// │   ├── rain_events  — rain event segmentation
/// │   ├── rainfall     — per-event rainfall statistics
/// │   ├── flow         — runoff volume, duration, peak flow
/// │   ├── balance      — inflow/outflow percent change
/// │   ├── optimizer    — Levenberg–Marquardt behind a solver trait
/// │   └── infiltration — adaptive-window decay fits on depth
/// └── report      — rain / flow / rainflow / infiltration reports
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod ingest;
pub mod model;
pub mod report;
