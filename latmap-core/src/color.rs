use serde::Serialize;

use crate::{Rgb, ScaleRange, Transform};

pub const FAST_COLOR: Rgb = Rgb::new(0x00, 0xb0, 0x50);
pub const SLOW_COLOR: Rgb = Rgb::new(0xff, 0x00, 0x00);

/// Floor applied before `log10` so zero latencies stay finite.
pub const LOG_FLOOR_MS: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorRamp {
    pub fast: Rgb,
    pub slow: Rgb,
}

impl Default for ColorRamp {
    fn default() -> Self {
        ColorRamp {
            fast: FAST_COLOR,
            slow: SLOW_COLOR,
        }
    }
}

impl ColorRamp {
    pub fn at(&self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let mix = |a: u8, b: u8| {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(
            mix(self.fast.r, self.slow.r),
            mix(self.fast.g, self.slow.g),
            mix(self.fast.b, self.slow.b),
        )
    }
}

/// Fill color for a value, or `missing` when there is nothing valid to show.
pub fn color_for(value: Option<f64>, range: &ScaleRange, ramp: &ColorRamp, missing: Rgb) -> Rgb {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => ramp.at(position(v, range)),
        _ => missing,
    }
}

/// Normalized position of `value` within `range`, in `[0, 1]`.
pub fn position(value: f64, range: &ScaleRange) -> f64 {
    let (v, lo, hi) = match range.transform {
        Transform::Linear => (value, range.min, range.max),
        Transform::Log => (to_log(value), to_log(range.min), to_log(range.max)),
    };
    let mut span = hi - lo;
    if span == 0.0 {
        span = 1.0;
    }
    let t = (v - lo) / span;
    if t.is_nan() {
        return 0.0;
    }
    t.clamp(0.0, 1.0)
}

fn to_log(v: f64) -> f64 {
    v.max(LOG_FLOOR_MS).log10()
}

fn from_log(v: f64) -> f64 {
    10f64.powf(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegendStop {
    pub value: f64,
    pub color: Rgb,
}

/// Evenly spaced legend stops from `range.min` to `range.max`.
///
/// Log ranges are spaced evenly in log space. Fewer than two steps still
/// yields both endpoints.
pub fn legend(range: &ScaleRange, ramp: &ColorRamp, steps: usize) -> Vec<LegendStop> {
    let steps = steps.max(2);
    let last = steps - 1;
    (0..steps)
        .map(|i| {
            let value = if i == 0 {
                range.min
            } else if i == last {
                range.max
            } else {
                let f = i as f64 / last as f64;
                match range.transform {
                    Transform::Linear => range.min + (range.max - range.min) * f,
                    Transform::Log => {
                        let (lo, hi) = (to_log(range.min), to_log(range.max));
                        from_log(lo + (hi - lo) * f)
                    }
                }
            };
            LegendStop {
                value,
                color: ramp.at(position(value, range)),
            }
        })
        .collect()
}
