use std::collections::HashMap;

use crate::{MeasurementRow, Metric};

/// Ascending valid values per metric, rebuilt whenever the row set changes.
#[derive(Debug, Clone, Default)]
pub struct MetricIndex {
    values: HashMap<Metric, Vec<f64>>,
}

impl MetricIndex {
    /// Rows without both country codes are skipped.
    pub fn build(rows: &[MeasurementRow]) -> Self {
        let mut values: HashMap<Metric, Vec<f64>> = HashMap::new();
        for metric in Metric::ALL {
            let mut v: Vec<f64> = rows
                .iter()
                .filter(|row| row.has_codes())
                .filter_map(|row| row.get(metric).valid())
                .collect();
            v.sort_by(f64::total_cmp);
            values.insert(metric, v);
        }
        MetricIndex { values }
    }

    pub fn values(&self, metric: Metric) -> &[f64] {
        self.values.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn percentile(&self, metric: Metric, p: f64) -> Option<f64> {
        percentile(self.values(metric), p)
    }
}

/// Linearly interpolated order statistic of an ascending slice.
///
/// `p` is in percent and is clamped to `[0, 100]`. Returns `None` only for an
/// empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let idx = p / 100.0 * last as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = idx - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
