use serde::Serialize;

use crate::{Metric, MetricIndex, ScaleConfig, Transform};

/// Smallest span an auto range may have.
pub const MIN_AUTO_SPAN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
    pub transform: Transform,
}

impl ScaleRange {
    pub fn new(min: f64, max: f64, transform: Transform) -> Self {
        ScaleRange { min, max, transform }
    }
}

/// Display range for `metric`.
///
/// Manual bounds are returned verbatim. Auto bounds come from the metric's
/// observed values at `p_low`/`p_high`, with `max > min` enforced.
pub fn compute_scale(index: &MetricIndex, metric: Metric, config: &ScaleConfig) -> ScaleRange {
    if !config.auto {
        return ScaleRange::new(config.min_ms, config.max_ms, config.transform);
    }
    let values = index.values(metric);
    let (Some(min), Some(mut max)) = (
        crate::percentile(values, config.p_low),
        crate::percentile(values, config.p_high),
    ) else {
        return ScaleRange::new(0.0, 1.0, config.transform);
    };
    if max <= min {
        max = min + MIN_AUTO_SPAN;
    }
    ScaleRange::new(min, max, config.transform)
}
