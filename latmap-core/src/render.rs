//! The render snapshot and the per-feature callbacks that read it.
//!
//! Every style or tooltip produced between two `recompute` calls is derived
//! from the same `RenderState`, so one paint pass never mixes scales.

use log::debug;
use serde::Serialize;

use crate::color::{color_for, ColorRamp};
use crate::scale::{compute_scale, ScaleRange};
use crate::{normalize_country, Dataset, Latency, Metric, Rgb, ScaleConfig, Transform};

pub const SOURCE_BORDER_COLOR: Rgb = Rgb::new(0x00, 0x00, 0x00);
pub const SOURCE_FILL_COLOR: Rgb = Rgb::new(0x33, 0x66, 0xff);
pub const DEST_BORDER_COLOR: Rgb = Rgb::new(0x55, 0x55, 0x55);
pub const MISSING_BORDER_COLOR: Rgb = Rgb::new(0x99, 0x99, 0x99);

/// Where the current selection comes from (UI widgets, CLI flags, tests).
pub trait Selection {
    fn source(&self) -> Option<String>;
    fn metric(&self) -> Metric;
    fn scale_config(&self) -> ScaleConfig;
}

/// Plain owned selection values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionInputs {
    pub source: Option<String>,
    pub metric: Metric,
    pub scale: ScaleConfig,
}

impl Selection for SelectionInputs {
    fn source(&self) -> Option<String> {
        self.source.clone()
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn scale_config(&self) -> ScaleConfig {
        self.scale.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderState {
    pub selected_source: Option<String>,
    pub selected_metric: Metric,
    pub scale_min: f64,
    pub scale_max: f64,
    pub transform: Transform,
    pub missing_color: Rgb,
}

impl RenderState {
    pub fn range(&self) -> ScaleRange {
        ScaleRange::new(self.scale_min, self.scale_max, self.transform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    pub weight: f64,
    pub opacity: f64,
    pub color: Rgb,
    pub fill_opacity: f64,
    pub fill_color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureRole {
    Source,
    Colored,
    Missing,
}

pub struct RenderStateCoordinator {
    dataset: Dataset,
    ramp: ColorRamp,
    state: RenderState,
    passes: u64,
}

impl RenderStateCoordinator {
    pub fn new(dataset: Dataset, ramp: ColorRamp) -> Self {
        let mut coordinator = RenderStateCoordinator {
            dataset,
            ramp,
            state: RenderState {
                selected_source: None,
                selected_metric: Metric::default(),
                scale_min: 0.0,
                scale_max: 1.0,
                transform: Transform::Linear,
                missing_color: crate::DEFAULT_MISSING_COLOR,
            },
            passes: 0,
        };
        coordinator.recompute(&SelectionInputs::default());
        coordinator.passes = 0;
        coordinator
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn ramp(&self) -> &ColorRamp {
        &self.ramp
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Reads the selection once and replaces the snapshot.
    pub fn recompute<S: Selection + ?Sized>(&mut self, selection: &S) -> &RenderState {
        let metric = selection.metric();
        let config = selection.scale_config();
        let source = selection
            .source()
            .map(|s| normalize_country(&s))
            .filter(|s| !s.is_empty());
        let range = compute_scale(self.dataset.index(), metric, &config);
        self.state = RenderState {
            selected_source: source,
            selected_metric: metric,
            scale_min: range.min,
            scale_max: range.max,
            transform: range.transform,
            missing_color: config.missing_color,
        };
        self.passes += 1;
        debug!(
            "render state: source={:?} metric={} scale=[{:.3}, {:.3}] {:?}",
            self.state.selected_source, metric, range.min, range.max, range.transform
        );
        &self.state
    }

    /// Metric value from the selected source to `code`.
    pub fn value_for(&self, code: &str) -> Latency {
        match &self.state.selected_source {
            Some(src) => self
                .dataset
                .value(src, &normalize_country(code), self.state.selected_metric),
            None => Latency::Absent,
        }
    }

    pub fn role_for(&self, code: &str) -> FeatureRole {
        let code = normalize_country(code);
        if !code.is_empty() && self.state.selected_source.as_deref() == Some(code.as_str()) {
            return FeatureRole::Source;
        }
        match self.value_for(&code) {
            Latency::Valid(_) => FeatureRole::Colored,
            _ => FeatureRole::Missing,
        }
    }

    pub fn fill_for(&self, code: &str) -> Rgb {
        color_for(
            self.value_for(code).valid(),
            &self.state.range(),
            &self.ramp,
            self.state.missing_color,
        )
    }

    pub fn style_for(&self, code: &str) -> FeatureStyle {
        match self.role_for(code) {
            FeatureRole::Source => FeatureStyle {
                weight: 2.0,
                opacity: 1.0,
                color: SOURCE_BORDER_COLOR,
                fill_opacity: 0.85,
                fill_color: SOURCE_FILL_COLOR,
            },
            FeatureRole::Colored => FeatureStyle {
                weight: 0.5,
                opacity: 0.8,
                color: DEST_BORDER_COLOR,
                fill_opacity: 0.75,
                fill_color: self.fill_for(code),
            },
            FeatureRole::Missing => FeatureStyle {
                weight: 0.5,
                opacity: 0.6,
                color: MISSING_BORDER_COLOR,
                fill_opacity: 0.35,
                fill_color: self.state.missing_color,
            },
        }
    }

    pub fn tooltip_for(&self, name: &str, code: &str) -> String {
        let code = normalize_country(code);
        let source = self.state.selected_source.as_deref().unwrap_or("-");
        format!(
            "{} ({})\nsource: {}\n{}: {}",
            name,
            if code.is_empty() { "?" } else { code.as_str() },
            source,
            self.state.selected_metric,
            format_latency(self.value_for(&code))
        )
    }
}

pub fn format_latency(value: Latency) -> String {
    match value {
        Latency::Valid(v) => format!("{:.1} ms", v),
        _ => "n/a".to_string(),
    }
}
