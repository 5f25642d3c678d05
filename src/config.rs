/// Analysis configuration loader - parses bmp.toml
///
/// Keeps the tunable analysis parameters (event separation window, drain
/// interval, smoothing and regression settings) out of the code so they can
/// be adjusted per site without recompiling. The loaded `AnalysisConfig` is
/// an immutable value passed by reference into every analysis call.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::analysis::optimizer::{ExponentialDecay, Model};
use crate::model::{BmpError, BmpResult};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "bmp.toml";

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub rain: RainConfig,
    pub flow: FlowConfig,
    pub infiltration: InfiltrationConfig,
}

/// Rain event segmentation and intensity settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RainConfig {
    /// Dry span (hours) that separates two rain events.
    pub hour_window_hours: u32,

    /// Rolling windows (minutes) for peak intensity.
    pub intensity_windows_minutes: Vec<u32>,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            hour_window_hours: 12,
            intensity_windows_minutes: vec![5, 10, 60],
        }
    }
}

/// Runoff statistics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    /// Drainage allowance (hours) appended to each rain event's flow window.
    pub drain_interval_hours: u32,

    /// Averaging window (minutes) for peak flow rate.
    pub peak_window_minutes: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            drain_interval_hours: 12,
            peak_window_minutes: 5,
        }
    }
}

/// Decay-fit search settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InfiltrationConfig {
    /// Median filter span in minutes.
    pub smoothing_window_minutes: f64,

    /// Initial regression window length, in samples.
    pub regression_window_samples: usize,

    /// Minimum acceptable R².
    pub r_squared_threshold: f64,

    /// Buffer (hours) on each side of the winning window for the extended fit curve.
    pub extension_hours: f64,

    /// Worker threads for per-offset fits.
    pub fit_threads: usize,

    /// Wall-clock budget per channel search; unlimited when absent.
    pub time_budget_secs: Option<u64>,
}

impl Default for InfiltrationConfig {
    fn default() -> Self {
        Self {
            smoothing_window_minutes: 15.0,
            regression_window_samples: 720,
            r_squared_threshold: 0.999,
            extension_hours: 12.0,
            fit_threads: 4,
            time_budget_secs: None,
        }
    }
}

impl AnalysisConfig {
    /// Parses a TOML document; missing sections and keys take their defaults.
    pub fn from_toml_str(contents: &str) -> BmpResult<Self> {
        let config: AnalysisConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every window and threshold is usable.
    pub fn validate(&self) -> BmpResult<()> {
        if self.rain.hour_window_hours == 0 {
            return Err(BmpError::Config("rain.hour_window_hours must be positive".into()));
        }
        if self.rain.intensity_windows_minutes.iter().any(|&w| w == 0) {
            return Err(BmpError::Config(
                "rain.intensity_windows_minutes entries must be positive".into(),
            ));
        }
        if self.flow.peak_window_minutes == 0 {
            return Err(BmpError::Config("flow.peak_window_minutes must be positive".into()));
        }

        let inf = &self.infiltration;
        if !(inf.smoothing_window_minutes.is_finite() && inf.smoothing_window_minutes >= 0.0) {
            return Err(BmpError::Config(
                "infiltration.smoothing_window_minutes must be non-negative".into(),
            ));
        }
        // The window search stops once a window is no larger than the parameter count.
        let floor = ExponentialDecay.parameter_count();
        if inf.regression_window_samples <= floor {
            return Err(BmpError::Config(format!(
                "infiltration.regression_window_samples must be greater than {}",
                floor
            )));
        }
        if !(inf.r_squared_threshold > 0.0 && inf.r_squared_threshold <= 1.0) {
            return Err(BmpError::Config(
                "infiltration.r_squared_threshold must be in (0, 1]".into(),
            ));
        }
        if !(inf.extension_hours.is_finite() && inf.extension_hours >= 0.0) {
            return Err(BmpError::Config(
                "infiltration.extension_hours must be non-negative".into(),
            ));
        }
        if inf.fit_threads == 0 {
            return Err(BmpError::Config("infiltration.fit_threads must be positive".into()));
        }
        Ok(())
    }
}

/// Loads analysis configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> BmpResult<AnalysisConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| BmpError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    AnalysisConfig::from_toml_str(&contents)
}

/// Loads `bmp.toml` from the working directory, or defaults if it is absent.
pub fn load_default_config() -> BmpResult<AnalysisConfig> {
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        load_config(DEFAULT_CONFIG_PATH)
    } else {
        Ok(AnalysisConfig::default())
    }
}
