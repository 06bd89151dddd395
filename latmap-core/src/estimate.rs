//! Average RTT reconstruction for rows that only carry partial statistics.
//!
//! The source tables store an unusable pair as `-1` and sometimes report the
//! mean of a sample set that still includes the invalid ones. When the row
//! carries no average of its own, the estimator guesses how much of the
//! sample set was invalid from which percentiles collapsed to the sentinel,
//! then backs the invalid contribution out of the mean.

use crate::{Latency, MeasurementRow};

pub const BASELINE_INVALID_FRACTION: f64 = 0.01;
pub const P50_INVALID_FRACTION: f64 = 0.70;
pub const P90_INVALID_FRACTION: f64 = 0.925;
pub const P95_INVALID_FRACTION: f64 = 0.975;

/// Value an invalid sample is assumed to have contributed to the reported mean.
pub const INVALID_SAMPLE_MS: f64 = 1.0;

/// Lower bounds on the invalid share implied by a sentinel percentile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidThresholds {
    pub baseline: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
}

impl Default for InvalidThresholds {
    fn default() -> Self {
        InvalidThresholds {
            baseline: BASELINE_INVALID_FRACTION,
            p50: P50_INVALID_FRACTION,
            p90: P90_INVALID_FRACTION,
            p95: P95_INVALID_FRACTION,
        }
    }
}

impl InvalidThresholds {
    /// Invalid fraction of `n` samples: at least one sample, and at least
    /// `100 - k` percent when the k-th percentile is a sentinel.
    pub fn invalid_fraction(&self, row: &MeasurementRow, n: u64) -> f64 {
        let mut fraction = (1.0 / n as f64).max(self.baseline);
        if row.p50_ms.is_invalid() {
            fraction = fraction.max(self.p50);
        }
        if row.p90_ms.is_invalid() {
            fraction = fraction.max(self.p90);
        }
        if row.p95_ms.is_invalid() {
            fraction = fraction.max(self.p95);
        }
        fraction
    }
}

pub fn compute_average(row: &MeasurementRow) -> Latency {
    compute_average_with(row, &InvalidThresholds::default())
}

pub fn compute_average_with(row: &MeasurementRow, thresholds: &InvalidThresholds) -> Latency {
    if row.average_ms != Latency::Absent {
        return row.average_ms;
    }

    let n = sample_count(row.n);
    if n == 0 || row.max_ms.is_invalid() {
        return Latency::Invalid;
    }
    let mean = match row.mean_ms {
        Latency::Absent => return Latency::Invalid,
        mean => mean,
    };
    if let Latency::Valid(mean) = mean {
        if !row.min_ms.is_invalid() {
            return Latency::Valid(mean);
        }
    }

    let invalid = invalid_count(thresholds.invalid_fraction(row, n), n);
    if invalid >= n {
        return Latency::Invalid;
    }
    if let Some(mean) = mean.valid() {
        let corrected =
            (mean * n as f64 + invalid as f64 * INVALID_SAMPLE_MS) / (n - invalid) as f64;
        if corrected.is_finite() && corrected >= 0.0 {
            return Latency::Valid(corrected);
        }
    }

    [row.p50_ms, row.p90_ms, row.p95_ms, row.max_ms]
        .into_iter()
        .find_map(Latency::valid)
        .map_or(Latency::Invalid, Latency::Valid)
}

/// Fills every row's `average_ms`; afterwards each one is `Valid` or `Invalid`.
pub fn enrich(rows: &mut [MeasurementRow]) {
    enrich_with(rows, &InvalidThresholds::default());
}

pub fn enrich_with(rows: &mut [MeasurementRow], thresholds: &InvalidThresholds) {
    for row in rows.iter_mut() {
        row.average_ms = compute_average_with(row, thresholds);
    }
}

fn sample_count(n: Option<f64>) -> u64 {
    match n.map(f64::round) {
        Some(v) if v > 0.0 => v as u64,
        _ => 0,
    }
}

// Clamped to [1, n - 1]; for n == 1 the result is 1 and the caller gives up.
fn invalid_count(fraction: f64, n: u64) -> u64 {
    let estimate = (fraction * n as f64).round() as u64;
    estimate.min(n.saturating_sub(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_EPSILON: f64 = 1e-9;

    fn row() -> MeasurementRow {
        MeasurementRow {
            src: "US".to_string(),
            dst: "DE".to_string(),
            n: None,
            mean_ms: Latency::Absent,
            min_ms: Latency::Absent,
            max_ms: Latency::Absent,
            p50_ms: Latency::Absent,
            p90_ms: Latency::Absent,
            p95_ms: Latency::Absent,
            average_ms: Latency::Absent,
        }
    }

    fn assert_valid(got: Latency, expected: f64) {
        match got {
            Latency::Valid(v) => assert!((v - expected).abs() < TEST_EPSILON, "{v} != {expected}"),
            other => panic!("expected Valid({expected}), got {other:?}"),
        }
    }

    #[test]
    fn provided_average_is_authoritative() {
        let mut r = row();
        r.average_ms = Latency::Valid(42.0);
        r.max_ms = Latency::Invalid;
        r.n = Some(0.0);
        assert_eq!(compute_average(&r), Latency::Valid(42.0));

        r.average_ms = Latency::Invalid;
        r.mean_ms = Latency::Valid(10.0);
        r.n = Some(5.0);
        assert_eq!(compute_average(&r), Latency::Invalid);
    }

    #[test]
    fn max_sentinel_invalidates_pair() {
        let mut r = row();
        r.n = Some(100.0);
        r.mean_ms = Latency::Valid(50.0);
        r.min_ms = Latency::Valid(5.0);
        r.p50_ms = Latency::Valid(40.0);
        r.max_ms = Latency::Invalid;
        assert_eq!(compute_average(&r), Latency::Invalid);
    }

    #[test]
    fn missing_count_or_mean_is_invalid() {
        let mut r = row();
        r.mean_ms = Latency::Valid(20.0);
        assert_eq!(compute_average(&r), Latency::Invalid);
        r.n = Some(0.4);
        assert_eq!(compute_average(&r), Latency::Invalid);
        r.n = Some(10.0);
        r.mean_ms = Latency::Absent;
        assert_eq!(compute_average(&r), Latency::Invalid);
    }

    #[test]
    fn mean_is_trusted_when_min_is_usable() {
        let mut r = row();
        r.n = Some(10.0);
        r.mean_ms = Latency::Valid(23.5);
        r.min_ms = Latency::Valid(11.0);
        r.p50_ms = Latency::Invalid;
        assert_eq!(compute_average(&r), Latency::Valid(23.5));

        r.min_ms = Latency::Absent;
        assert_eq!(compute_average(&r), Latency::Valid(23.5));
    }

    #[test]
    fn p50_sentinel_backs_out_seventy_percent() {
        let mut r = row();
        r.n = Some(100.0);
        r.mean_ms = Latency::Valid(50.0);
        r.min_ms = Latency::Invalid;
        r.p50_ms = Latency::Invalid;
        r.p90_ms = Latency::Valid(10.0);
        r.p95_ms = Latency::Valid(20.0);
        r.max_ms = Latency::Valid(80.0);
        assert_valid(compute_average(&r), 5070.0 / 30.0);
    }

    #[test]
    fn p90_sentinel_clamps_to_one_valid_sample() {
        let mut r = row();
        r.n = Some(10.0);
        r.mean_ms = Latency::Valid(30.0);
        r.min_ms = Latency::Invalid;
        r.p50_ms = Latency::Valid(40.0);
        r.p90_ms = Latency::Invalid;
        r.p95_ms = Latency::Valid(60.0);
        r.max_ms = Latency::Valid(80.0);
        assert_valid(compute_average(&r), 309.0);
    }

    #[test]
    fn baseline_assumes_at_least_one_invalid_sample() {
        let mut r = row();
        r.n = Some(20.0);
        r.mean_ms = Latency::Valid(19.0);
        r.min_ms = Latency::Invalid;
        // 1/20 beats the 1% floor: one invalid sample.
        assert_valid(compute_average(&r), (19.0 * 20.0 + 1.0) / 19.0);
    }

    #[test]
    fn single_sample_cannot_be_reconstructed() {
        let mut r = row();
        r.n = Some(1.0);
        r.mean_ms = Latency::Valid(12.0);
        r.min_ms = Latency::Invalid;
        r.p50_ms = Latency::Valid(12.0);
        assert_eq!(compute_average(&r), Latency::Invalid);
    }

    #[test]
    fn sentinel_mean_falls_back_to_first_usable_percentile() {
        let mut r = row();
        r.n = Some(10.0);
        r.mean_ms = Latency::Invalid;
        r.min_ms = Latency::Invalid;
        r.p50_ms = Latency::Invalid;
        r.p90_ms = Latency::Valid(70.0);
        r.max_ms = Latency::Valid(90.0);
        assert_eq!(compute_average(&r), Latency::Valid(70.0));

        r.p90_ms = Latency::Absent;
        assert_eq!(compute_average(&r), Latency::Valid(90.0));

        r.max_ms = Latency::Absent;
        assert_eq!(compute_average(&r), Latency::Invalid);
    }

    #[test]
    fn estimation_is_deterministic() {
        let mut r = row();
        r.n = Some(37.0);
        r.mean_ms = Latency::Valid(18.25);
        r.min_ms = Latency::Invalid;
        r.p95_ms = Latency::Invalid;
        let first = compute_average(&r);
        for _ in 0..10 {
            assert_eq!(compute_average(&r), first);
        }
    }

    #[test]
    fn custom_thresholds_change_the_invalid_share() {
        let mut r = row();
        r.n = Some(10.0);
        r.mean_ms = Latency::Valid(10.0);
        r.min_ms = Latency::Invalid;
        r.p50_ms = Latency::Invalid;
        let thresholds = InvalidThresholds {
            p50: 0.5,
            ..InvalidThresholds::default()
        };
        assert_valid(compute_average_with(&r, &thresholds), (100.0 + 5.0) / 5.0);
    }

    #[test]
    fn enrich_fills_every_row() {
        let mut a = row();
        a.average_ms = Latency::Valid(3.0);
        let b = row();
        let mut rows = vec![a, b];
        enrich(&mut rows);
        assert_eq!(rows[0].average_ms, Latency::Valid(3.0));
        assert_eq!(rows[1].average_ms, Latency::Invalid);
        assert!(rows.iter().all(|r| r.average_ms != Latency::Absent));
    }
}
