use std::collections::{BTreeSet, HashMap};

use log::{info, warn};

use crate::estimate::{enrich_with, InvalidThresholds};
use crate::{Latency, MeasurementRow, Metric, MetricIndex, RawRow};

/// The enriched row set plus everything derived from it at load time.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<MeasurementRow>,
    pairs: HashMap<(String, String), usize>,
    index: MetricIndex,
}

impl Dataset {
    pub fn from_raw(raw: &[RawRow]) -> Self {
        Self::from_raw_with(raw, &InvalidThresholds::default())
    }

    pub fn from_raw_with(raw: &[RawRow], thresholds: &InvalidThresholds) -> Self {
        let rows: Vec<MeasurementRow> = raw.iter().map(MeasurementRow::from_raw).collect();
        Self::from_rows_with(rows, thresholds)
    }

    pub fn from_rows_with(rows: Vec<MeasurementRow>, thresholds: &InvalidThresholds) -> Self {
        let total = rows.len();
        let mut rows: Vec<MeasurementRow> = rows.into_iter().filter(|r| r.has_codes()).collect();
        let dropped = total - rows.len();
        if dropped > 0 {
            warn!("dropped {} rows without src/dst country codes", dropped);
        }
        enrich_with(&mut rows, thresholds);

        let mut pairs = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            pairs.insert((row.src.clone(), row.dst.clone()), i);
        }
        let index = MetricIndex::build(&rows);
        let usable = rows.iter().filter(|r| r.average_ms.valid().is_some()).count();
        info!(
            "loaded {} rows ({} pairs, {} with a usable average)",
            rows.len(),
            pairs.len(),
            usable
        );
        Dataset { rows, pairs, index }
    }

    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    pub fn index(&self) -> &MetricIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct source codes, sorted.
    pub fn sources(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.rows.iter().map(|r| r.src.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Destinations reported for `src`, sorted.
    pub fn destinations(&self, src: &str) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .rows
            .iter()
            .filter(|r| r.src == src)
            .map(|r| r.dst.as_str())
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn row(&self, src: &str, dst: &str) -> Option<&MeasurementRow> {
        let i = self.pairs.get(&(src.to_string(), dst.to_string()))?;
        self.rows.get(*i)
    }

    pub fn value(&self, src: &str, dst: &str, metric: Metric) -> Latency {
        self.row(src, dst).map_or(Latency::Absent, |r| r.get(metric))
    }
}
