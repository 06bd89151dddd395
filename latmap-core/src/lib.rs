pub mod color;
pub mod dataset;
pub mod estimate;
pub mod index;
pub mod refresh;
pub mod render;
pub mod scale;
pub mod table;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use color::{color_for, legend, ColorRamp, LegendStop};
pub use dataset::Dataset;
pub use estimate::{compute_average, enrich, InvalidThresholds};
pub use index::{percentile, MetricIndex};
pub use refresh::{RefreshPhase, RefreshScheduler};
pub use render::{
    format_latency, FeatureRole, FeatureStyle, RenderState, RenderStateCoordinator, Selection,
    SelectionInputs,
};
pub use scale::{compute_scale, ScaleRange};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed row table: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed geography: {0}")]
    Geography(String),
}

/// A latency cell after crossing the table boundary.
///
/// The wire format overloads `-1` to mean "no valid samples"; inside the
/// engine that case is its own variant so it can never leak into arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Latency {
    #[default]
    Absent,
    Invalid,
    Valid(f64),
}

impl Latency {
    pub fn from_wire(value: Option<f64>) -> Self {
        match value {
            Some(v) if !v.is_finite() => Latency::Absent,
            Some(v) if v < 0.0 => Latency::Invalid,
            Some(v) => Latency::Valid(v),
            None => Latency::Absent,
        }
    }

    pub fn to_wire(self) -> Option<f64> {
        match self {
            Latency::Absent => None,
            Latency::Invalid => Some(-1.0),
            Latency::Valid(v) => Some(v),
        }
    }

    pub fn valid(self) -> Option<f64> {
        match self {
            Latency::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_invalid(self) -> bool {
        matches!(self, Latency::Invalid)
    }
}

/// Parses a table cell into a finite number. Blank or garbage cells are absent.
pub fn coerce_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn normalize_country(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Metric {
    #[default]
    #[serde(rename = "average_ms")]
    Average,
    #[serde(rename = "mean_ms")]
    Mean,
    #[serde(rename = "min_ms")]
    Min,
    #[serde(rename = "max_ms")]
    Max,
    #[serde(rename = "p50_ms")]
    P50,
    #[serde(rename = "p90_ms")]
    P90,
    #[serde(rename = "p95_ms")]
    P95,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Average,
        Metric::Mean,
        Metric::Min,
        Metric::Max,
        Metric::P50,
        Metric::P90,
        Metric::P95,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Average => "average_ms",
            Metric::Mean => "mean_ms",
            Metric::Min => "min_ms",
            Metric::Max => "max_ms",
            Metric::P50 => "p50_ms",
            Metric::P90 => "p90_ms",
            Metric::P95 => "p95_ms",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Average => "Average RTT",
            Metric::Mean => "Mean RTT",
            Metric::Min => "Min RTT",
            Metric::Max => "Max RTT",
            Metric::P50 => "Median RTT (p50)",
            Metric::P90 => "p90 RTT",
            Metric::P95 => "p95 RTT",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s || m.name().trim_end_matches("_ms") == s)
            .ok_or_else(|| format!("unknown metric: {s}"))
    }
}

/// One table row exactly as acquired: untyped cells keyed by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub src_country: Option<String>,
    pub dst_country: Option<String>,
    pub n: Option<String>,
    pub mean_ms: Option<String>,
    pub min_ms: Option<String>,
    pub max_ms: Option<String>,
    pub p50_ms: Option<String>,
    pub p90_ms: Option<String>,
    pub p95_ms: Option<String>,
    pub average_ms: Option<String>,
}

impl RawRow {
    /// Builds a row from `(column, cell)` pairs; unknown columns are ignored.
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut row = RawRow::default();
        for (column, cell) in cells {
            let slot = match column.trim().to_ascii_lowercase().as_str() {
                "src_country" => &mut row.src_country,
                "dst_country" => &mut row.dst_country,
                "n" => &mut row.n,
                "mean_ms" => &mut row.mean_ms,
                "min_ms" => &mut row.min_ms,
                "max_ms" => &mut row.max_ms,
                "p50_ms" => &mut row.p50_ms,
                "p90_ms" => &mut row.p90_ms,
                "p95_ms" => &mut row.p95_ms,
                "average_ms" => &mut row.average_ms,
                _ => continue,
            };
            *slot = Some(cell);
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub src: String,
    pub dst: String,
    pub n: Option<f64>,
    pub mean_ms: Latency,
    pub min_ms: Latency,
    pub max_ms: Latency,
    pub p50_ms: Latency,
    pub p90_ms: Latency,
    pub p95_ms: Latency,
    pub average_ms: Latency,
}

impl MeasurementRow {
    pub fn from_raw(raw: &RawRow) -> Self {
        let code = |cell: &Option<String>| {
            cell.as_deref()
                .map(normalize_country)
                .unwrap_or_default()
        };
        let number = |cell: &Option<String>| cell.as_deref().and_then(coerce_number);
        let latency = |cell: &Option<String>| Latency::from_wire(number(cell));
        MeasurementRow {
            src: code(&raw.src_country),
            dst: code(&raw.dst_country),
            n: number(&raw.n),
            mean_ms: latency(&raw.mean_ms),
            min_ms: latency(&raw.min_ms),
            max_ms: latency(&raw.max_ms),
            p50_ms: latency(&raw.p50_ms),
            p90_ms: latency(&raw.p90_ms),
            p95_ms: latency(&raw.p95_ms),
            average_ms: latency(&raw.average_ms),
        }
    }

    pub fn has_codes(&self) -> bool {
        !self.src.is_empty() && !self.dst.is_empty()
    }

    pub fn get(&self, metric: Metric) -> Latency {
        match metric {
            Metric::Average => self.average_ms,
            Metric::Mean => self.mean_ms,
            Metric::Min => self.min_ms,
            Metric::Max => self.max_ms,
            Metric::P50 => self.p50_ms,
            Metric::P90 => self.p90_ms,
            Metric::P95 => self.p95_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    Linear,
    Log,
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "lin" => Ok(Transform::Linear),
            "log" | "log10" => Ok(Transform::Log),
            other => Err(format!("unknown transform: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(format!("color contains invalid hex: {s}"));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(format!("color must be #rgb or #rrggbb: {s}")),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| format!("color contains invalid hex: {s}"))
        };
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

pub const DEFAULT_MISSING_COLOR: Rgb = Rgb::new(0xcc, 0xcc, 0xcc);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScaleConfig {
    pub auto: bool,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p_low: f64,
    pub p_high: f64,
    pub transform: Transform,
    pub missing_color: Rgb,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            auto: true,
            min_ms: 0.0,
            max_ms: 300.0,
            p_low: 5.0,
            p_high: 95.0,
            transform: Transform::Linear,
            missing_color: DEFAULT_MISSING_COLOR,
        }
    }
}

impl ScaleConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
