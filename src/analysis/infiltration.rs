/// Infiltration rate from exponential recession fits on piezometer depth.
///
/// The depth record is median-smoothed, then searched for the contiguous
/// window that best follows `y0·exp(−k·t) + c`. The search starts at the
/// configured window length and, while no window reaches the R² threshold,
/// shrinks by roughly one hour of samples and tries again. Every start
/// offset at a given size is an independent fit, so offsets are fanned out
/// over a thread pool and reduced in offset order.
///
/// ```text
///  depth
///   |‾‾‾‾‾\
///   |      \.            <- winning window
///   |        `-._
///   |            ‾‾--.__
///   +-------------------- t
/// ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use super::optimizer::{ExponentialDecay, LevenbergMarquardt, Model, Optimizer};
use super::resample::resample;
use crate::config::InfiltrationConfig;
use crate::model::{ChannelFit, DecayFitResult, DecayParams, FitStatus, Reading, TimeSeries};

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Limits on one channel's window search.
///
/// The timeout starts counting when a channel's search begins; the
/// cancellation flag is shared and stops every search holding a clone.
/// Offsets already fitted when the budget runs out are still considered:
/// if the best of them reaches the R² threshold it is reported as the fit,
/// otherwise the channel is `BudgetExhausted`.
#[derive(Debug, Clone, Default)]
pub struct FitBudget {
    timeout: Option<Duration>,
    cancelled: Arc<AtomicBool>,
}

impl FitBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Budget from `time_budget_secs`, unlimited when unset.
    pub fn from_config(config: &InfiltrationConfig) -> Self {
        match config.time_budget_secs {
            Some(secs) => Self::with_timeout(Duration::from_secs(secs)),
            None => Self::unlimited(),
        }
    }

    /// Stops every search holding this budget or a clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn start(&self) -> BudgetClock {
        BudgetClock {
            deadline: self.timeout.map(|t| Instant::now() + t),
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

/// A started budget, shared with the workers.
#[derive(Clone)]
struct BudgetClock {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl BudgetClock {
    fn exhausted(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

/// Mean spacing between consecutive readings, in seconds.
pub fn mean_interval_secs(readings: &[Reading]) -> Option<f64> {
    let (first, last) = (readings.first()?, readings.last()?);
    if readings.len() < 2 {
        return None;
    }
    let span = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
    Some(span / (readings.len() - 1) as f64)
}

/// Median kernel width in samples: the smoothing span divided by the mean
/// interval, at least one, always odd.
pub fn median_kernel(smoothing_window_minutes: f64, mean_interval_s: f64) -> usize {
    let width = (smoothing_window_minutes * 60.0 / mean_interval_s).ceil();
    let width = if width.is_finite() && width >= 1.0 { width as usize } else { 1 };
    if width % 2 == 0 { width + 1 } else { width }
}

/// Centered running median. Near either end the window shrinks
/// symmetrically, so the first and last samples pass through unchanged.
pub fn smooth_depths(values: &[f64], kernel: usize) -> Vec<f64> {
    let half = kernel / 2;
    let n = values.len();
    let mut scratch = Vec::with_capacity(kernel);

    (0..n)
        .map(|i| {
            let h = half.min(i).min(n - 1 - i);
            scratch.clear();
            scratch.extend_from_slice(&values[i - h..=i + h]);
            scratch.sort_by(f64::total_cmp);
            scratch[h]
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Window fits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    offset: usize,
    params: DecayParams,
    r_squared: f64,
}

impl Candidate {
    /// Higher R² wins; equal R² goes to the earlier window.
    fn beats(&self, other: &Candidate) -> bool {
        self.r_squared > other.r_squared || (self.r_squared == other.r_squared && self.offset < other.offset)
    }
}

/// Fits one window. Time and depth are each scaled to [0, 1] by their
/// maxima before fitting and the parameters are scaled back afterwards;
/// R² is taken on the scaled residuals.
fn fit_window(
    optimizer: &dyn Optimizer,
    elapsed: &[f64],
    depth: &[f64],
    offset: usize,
    size: usize,
) -> Option<Candidate> {
    let model = ExponentialDecay;
    let t0 = elapsed[offset];
    let t: Vec<f64> = elapsed[offset..offset + size].iter().map(|s| s - t0).collect();
    let y = &depth[offset..offset + size];

    let t_max = t.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let t_scale = if t_max != 0.0 { t_max } else { 1.0 };
    let y_scale = if y_max != 0.0 { y_max } else { 1.0 };

    let t_norm: Vec<f64> = t.iter().map(|v| v / t_scale).collect();
    let y_norm: Vec<f64> = y.iter().map(|v| v / y_scale).collect();

    let first = y_norm[0];
    let last = y_norm[size - 1];
    let amplitude = if first != last { first - last } else { 1e-3 };

    let p = optimizer.fit(&model, &t_norm, &y_norm, &[amplitude, 1.0, last]).ok()?;

    let mean = y_norm.iter().sum::<f64>() / size as f64;
    let ss_tot: f64 = y_norm.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot <= 0.0 {
        return None;
    }
    let ss_res: f64 = t_norm
        .iter()
        .zip(&y_norm)
        .map(|(&ti, &yi)| (yi - model.value(ti, &p)).powi(2))
        .sum();
    let r_squared = 1.0 - ss_res / ss_tot;

    let params = DecayParams {
        y0: p[0] * y_scale,
        k: p[1] / t_scale,
        c: p[2] * y_scale,
    };
    let finite = r_squared.is_finite() && params.y0.is_finite() && params.k.is_finite() && params.c.is_finite();
    finite.then_some(Candidate { offset, params, r_squared })
}

enum Attempt {
    Fitted(Candidate),
    Skipped,
    OutOfBudget,
}

/// Outcome of trying every offset at one window size.
struct SizeSearch {
    best: Option<Candidate>,
    /// Some offsets were skipped because the budget ran out.
    out_of_budget: bool,
}

/// Best window among the offsets fitted at one size.
fn search_size(
    pool: &ThreadPool,
    optimizer: &Arc<dyn Optimizer>,
    elapsed: &Arc<Vec<f64>>,
    depth: &Arc<Vec<f64>>,
    size: usize,
    clock: &BudgetClock,
) -> SizeSearch {
    let offsets = elapsed.len() + 1 - size;
    let (tx, rx) = mpsc::channel();

    for offset in 0..offsets {
        let tx = tx.clone();
        let optimizer = Arc::clone(optimizer);
        let elapsed = Arc::clone(elapsed);
        let depth = Arc::clone(depth);
        let clock = clock.clone();

        pool.execute(move || {
            let attempt = if clock.exhausted() {
                Attempt::OutOfBudget
            } else {
                match fit_window(optimizer.as_ref(), &elapsed, &depth, offset, size) {
                    Some(candidate) => Attempt::Fitted(candidate),
                    None => Attempt::Skipped,
                }
            };
            let _ = tx.send(attempt);
        });
    }
    drop(tx);

    let mut best: Option<Candidate> = None;
    let mut out_of_budget = false;
    for attempt in rx.iter().take(offsets) {
        match attempt {
            Attempt::Fitted(candidate) => {
                if best.is_none_or(|b| candidate.beats(&b)) {
                    best = Some(candidate);
                }
            }
            Attempt::Skipped => {}
            Attempt::OutOfBudget => out_of_budget = true,
        }
    }

    SizeSearch { best, out_of_budget }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

fn offset_time(base: NaiveDateTime, seconds: f64) -> NaiveDateTime {
    base + chrono::Duration::milliseconds((seconds * 1000.0).round() as i64)
}

/// Fits one depth channel with the default Levenberg–Marquardt solver.
pub fn fit_infiltration(series: &TimeSeries, config: &InfiltrationConfig, budget: &FitBudget) -> ChannelFit {
    fit_infiltration_with(series, config, budget, Arc::new(LevenbergMarquardt::default()))
}

/// Fits one depth channel with the given solver.
pub fn fit_infiltration_with(
    series: &TimeSeries,
    config: &InfiltrationConfig,
    budget: &FitBudget,
    optimizer: Arc<dyn Optimizer>,
) -> ChannelFit {
    let no_fit = ChannelFit {
        status: FitStatus::NoAcceptableFit,
        fit: None,
    };

    let readings = match resample(series) {
        Some(grid) => grid.valid_readings(),
        None => return no_fit,
    };
    let Some(mean_dt) = mean_interval_secs(&readings) else {
        return no_fit;
    };

    let start = readings[0].timestamp;
    let raw: Vec<f64> = readings.iter().map(|r| r.value).collect();
    let kernel = median_kernel(config.smoothing_window_minutes, mean_dt);
    let depth = Arc::new(smooth_depths(&raw, kernel));
    let elapsed = Arc::new(
        readings
            .iter()
            .map(|r| (r.timestamp - start).num_milliseconds() as f64 / 1000.0)
            .collect::<Vec<f64>>(),
    );

    let decrement = ((3600.0 / mean_dt).ceil() as usize).max(1);
    let min_size = ExponentialDecay.parameter_count();
    let pool = ThreadPool::new(config.fit_threads.max(1));
    let clock = budget.start();

    debug!(samples = readings.len(), mean_dt, kernel, decrement, "starting decay window search");

    let mut size = config.regression_window_samples;
    let mut winner = None;
    while size > min_size {
        if clock.exhausted() {
            warn!(size, "fit budget exhausted");
            return ChannelFit {
                status: FitStatus::BudgetExhausted,
                fit: None,
            };
        }

        if size <= elapsed.len() {
            let search = search_size(&pool, &optimizer, &elapsed, &depth, size, &clock);
            debug!(size, r_squared = search.best.map(|b| b.r_squared), "window size searched");
            if let Some(best) = search.best.filter(|b| b.r_squared >= config.r_squared_threshold) {
                if search.out_of_budget {
                    info!(size, offset = best.offset, "fit budget ran out, keeping accepted window");
                }
                winner = Some((best, size));
                break;
            }
            if search.out_of_budget {
                warn!(size, "fit budget exhausted");
                return ChannelFit {
                    status: FitStatus::BudgetExhausted,
                    fit: None,
                };
            }
        }

        size = size.saturating_sub(decrement);
    }

    let Some((best, size)) = winner else {
        info!(threshold = config.r_squared_threshold, "no window reached the R² threshold");
        return no_fit;
    };

    let window = &readings[best.offset..best.offset + size];
    let window_start = window[0].timestamp;
    let window_end = window[size - 1].timestamp;
    let window_depth = depth[best.offset..best.offset + size].to_vec();

    let k_per_hour = best.params.k * 3600.0;
    let average_depth = window_depth.iter().sum::<f64>() / size as f64;
    let window_duration_s = (window_end - window_start).num_milliseconds() as f64 / 1000.0;

    // Extended axis: the window plus `extension_hours` on each side.
    let extension_s = config.extension_hours * 3600.0;
    let step = mean_dt.max(1.0);
    let steps = ((window_duration_s + 2.0 * extension_s) / step).floor() as usize;
    let (extended_time, extended_fit): (Vec<NaiveDateTime>, Vec<f64>) = (0..=steps)
        .map(|i| {
            let relative = i as f64 * step - extension_s;
            (offset_time(window_start, relative), best.params.evaluate(relative))
        })
        .unzip();

    info!(
        r_squared = best.r_squared,
        k_per_hour,
        window_size = size,
        "fitted decay window"
    );

    ChannelFit {
        status: FitStatus::Fitted,
        fit: Some(DecayFitResult {
            window_time: window.iter().map(|r| r.timestamp).collect(),
            window_depth,
            params: best.params,
            r_squared: best.r_squared,
            k_per_hour,
            infiltration_rate: k_per_hour * average_depth,
            window_size: size,
            window_duration_hours: window_duration_s / 3600.0,
            average_depth,
            extended_time,
            extended_fit,
        }),
    }
}
