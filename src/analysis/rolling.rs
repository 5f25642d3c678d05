/// Time-keyed sliding-window accumulator.
///
/// Rolling sums and means over irregular sampling have to be bounded by
/// elapsed time, not by a fixed number of samples. `RollingWindow` holds the
/// samples whose key lies in `(latest − span, latest]`, where keys are
/// seconds on any monotone clock the caller chooses.
///
/// A leading (forward-looking) window is the same accumulator walked in
/// reverse with negated keys: holding `(−t − span, −t]` is holding `[t, t + span)`.

use std::collections::VecDeque;

/// Accumulated sums below this are floating-point residue from the
/// add/subtract bookkeeping and are reported as zero.
pub const NOISE_FLOOR: f64 = 1e-9;

/// Replaces near-zero accumulation noise with an exact zero.
pub fn clamp_noise(sum: f64) -> f64 {
    if sum < NOISE_FLOOR { 0.0 } else { sum }
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    span: i64,
    entries: VecDeque<(i64, f64)>,
    sum: f64,
}

impl RollingWindow {
    /// Creates an empty window covering `span` key units (seconds).
    pub fn new(span: i64) -> Self {
        Self {
            span,
            entries: VecDeque::new(),
            sum: 0.0,
        }
    }

    /// Moves the window's right edge to `key`, evicting samples that fell out.
    ///
    /// Keys passed to `advance` and `push` must be non-decreasing.
    pub fn advance(&mut self, key: i64) {
        let cutoff = key - self.span;
        while let Some(&(k, v)) = self.entries.front() {
            if k > cutoff {
                break;
            }
            self.entries.pop_front();
            self.sum -= v;
        }
        if self.entries.is_empty() {
            self.sum = 0.0;
        }
    }

    /// Adds a sample at `key` and advances the window to it.
    pub fn push(&mut self, key: i64, value: f64) {
        self.entries.push_back((key, value));
        self.sum += value;
        self.advance(key);
    }

    /// Sum of the samples in the window; `None` when the window holds none.
    pub fn sum(&self) -> Option<f64> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.sum)
        }
    }

    /// Mean of the samples in the window; `None` when the window holds none.
    pub fn mean(&self) -> Option<f64> {
        self.sum().map(|s| s / self.entries.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_open_on_the_left() {
        // span 10: at key 10 the sample at key 0 is exactly span old and drops out.
        let mut window = RollingWindow::new(10);
        window.push(0, 1.0);
        window.push(5, 2.0);
        assert_eq!(window.sum(), Some(3.0));

        window.advance(10);
        assert_eq!(window.sum(), Some(2.0), "key 0 is outside (0, 10]");

        window.advance(15);
        assert_eq!(window.sum(), None, "window should be empty");
    }

    #[test]
    fn test_mean_tracks_members() {
        let mut window = RollingWindow::new(300);
        window.push(0, 2.0);
        window.push(60, 4.0);
        window.push(120, 6.0);
        assert_eq!(window.mean(), Some(4.0));

        window.push(330, 8.0);
        // key 0 evicted (330 - 300 = 30 >= 0)
        assert_eq!(window.mean(), Some(6.0));
    }

    #[test]
    fn test_negated_keys_give_leading_window() {
        // Samples at t = 0, 4, 9 walked in reverse; leading window [t, t + 5).
        let samples = [(0i64, 1.0), (4, 2.0), (9, 4.0)];
        let mut window = RollingWindow::new(5);
        let mut sums = Vec::new();
        for &(t, v) in samples.iter().rev() {
            window.push(-t, v);
            sums.push((t, window.sum()));
        }
        // t=9: {9}; t=4: {4} (9 is not < 4+5); t=0: {0, 4}
        assert_eq!(sums, vec![(9, Some(4.0)), (4, Some(2.0)), (0, Some(3.0))]);
    }

    #[test]
    fn test_clamp_noise_zeroes_residue() {
        assert_eq!(clamp_noise(3e-12), 0.0);
        assert_eq!(clamp_noise(-1e-15), 0.0);
        assert_eq!(clamp_noise(0.254), 0.254);
    }

    #[test]
    fn test_sum_resets_exactly_when_emptied() {
        let mut window = RollingWindow::new(1);
        window.push(0, 0.1);
        window.push(0, 0.2);
        window.advance(5);
        window.push(5, 0.3);
        assert_eq!(window.sum(), Some(0.3));
    }
}
