//! Rolling-window means over the locally stored metric samples.

use serde::Serialize;
use tracing::trace;

use yarnscale_core::{Direction, Metric, MetricThreshold, MetricWindowStore};

use crate::error::{ScaleError, ScaleResult};

/// Mean of one metric over one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowMean {
    pub metric: Metric,
    pub mean: f64,
    pub samples: usize,
    pub expected: u64,
}

/// Computes window means for one cluster with a data-sufficiency policy.
///
/// A window is usable only if it holds at least
/// `expected * sufficiency_ratio` samples, where `expected` is the window
/// length divided by the sampling interval. An empty window is never
/// usable.
pub struct WindowEvaluator<'a> {
    store: &'a dyn MetricWindowStore,
    cluster: &'a str,
    sampling_interval_secs: u64,
    sufficiency_ratio: f64,
}

impl<'a> WindowEvaluator<'a> {
    pub fn new(
        store: &'a dyn MetricWindowStore,
        cluster: &'a str,
        sampling_interval_secs: u64,
        sufficiency_ratio: f64,
    ) -> Self {
        Self {
            store,
            cluster,
            sampling_interval_secs,
            sufficiency_ratio,
        }
    }

    /// Number of samples a full window holds.
    pub fn expected_samples(&self, window_minutes: u64) -> u64 {
        window_minutes
            .saturating_mul(60)
            .checked_div(self.sampling_interval_secs)
            .unwrap_or(0)
    }

    /// Mean of `metric` over `[now - window, now]`.
    ///
    /// `direction` only labels the `InsufficientData` error.
    pub fn mean(
        &self,
        direction: Direction,
        metric: Metric,
        threshold: MetricThreshold,
        now: u64,
    ) -> ScaleResult<WindowMean> {
        let from = now.saturating_sub(threshold.window_minutes.saturating_mul(60));
        let samples = self
            .store
            .query(self.cluster, metric, from, now)
            .map_err(|e| ScaleError::State(format!("{e:#}")))?;

        let expected = self.expected_samples(threshold.window_minutes);
        let actual = samples.len();
        if actual == 0 || (actual as f64) < expected as f64 * self.sufficiency_ratio {
            return Err(ScaleError::InsufficientData {
                direction,
                metric,
                actual,
                expected,
            });
        }

        let mean = samples.iter().map(|s| s.value).sum::<f64>() / actual as f64;
        trace!(cluster = %self.cluster, %metric, mean, actual, expected, "window mean");
        Ok(WindowMean {
            metric,
            mean,
            samples: actual,
            expected,
        })
    }
}
