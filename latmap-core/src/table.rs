//! Acquisition adapters: the row table (CSV or JSONL) and GeoJSON features.
//!
//! Everything here hands back raw cells; numeric coercion and the sentinel
//! conversion happen in `MeasurementRow::from_raw`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::{normalize_country, LoadError, RawRow};

const CODE_PROPERTIES: [&str; 4] = ["ISO_A2", "iso_a2", "ISO3166-1-Alpha-2", "code"];
const NAME_PROPERTIES: [&str; 3] = ["NAME", "name", "ADMIN"];

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<RawRow>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record?;
        out.push(RawRow::from_cells(
            headers.iter().zip(record.iter().map(str::to_string)),
        ));
    }
    Ok(out)
}

/// One JSON object per line. Blank and malformed lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R) -> io::Result<Vec<RawRow>> {
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Map<String, Value>>(&line) {
            Ok(obj) => out.push(RawRow::from_cells(
                obj.iter()
                    .filter_map(|(k, v)| cell_text(v).map(|cell| (k.as_str(), cell))),
            )),
            Err(err) => warn!("skipping line {}: {}", i + 1, err),
        }
    }
    Ok(out)
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads a row table, choosing JSONL for `.jsonl`/`.ndjson` and CSV otherwise.
pub fn load_rows<P: AsRef<Path>>(path: P) -> Result<Vec<RawRow>, LoadError> {
    let path = path.as_ref();
    let io_err = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let is_jsonl = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsonl") | Some("ndjson")
    );
    if is_jsonl {
        read_jsonl(BufReader::new(file)).map_err(io_err)
    } else {
        read_csv(file)
    }
}

/// A map feature as the renderer knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub code: String,
    pub name: String,
}

pub fn read_features<R: Read>(reader: R) -> Result<Vec<Feature>, LoadError> {
    let doc: Value = serde_json::from_reader(reader)
        .map_err(|e| LoadError::Geography(e.to_string()))?;
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::Geography("expected a FeatureCollection".to_string()))?;
    Ok(features.iter().map(feature_from_json).collect())
}

pub fn load_features<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_features(BufReader::new(file))
}

fn feature_from_json(feature: &Value) -> Feature {
    let props = feature.get("properties");
    let first = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| props.and_then(|p| p.get(*k)).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty() && *s != "-99")
            .map(str::to_string)
    };
    let code = first(&CODE_PROPERTIES)
        .map(|c| normalize_country(&c))
        .unwrap_or_default();
    let name = first(&NAME_PROPERTIES).unwrap_or_else(|| code.clone());
    Feature { code, name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Latency, MeasurementRow};

    #[test]
    fn csv_rows_keep_blank_and_sentinel_cells() {
        let data = "src_country,dst_country,n,mean_ms,min_ms,max_ms,p50_ms,p90_ms,p95_ms,average_ms\n\
                    us,de,10,30,-1,80,40,-1,60,\n\
                    US,FR,,,,,,,,12.5\n";
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        let first = MeasurementRow::from_raw(&rows[0]);
        assert_eq!(first.src, "US");
        assert_eq!(first.min_ms, Latency::Invalid);
        assert_eq!(first.p90_ms, Latency::Invalid);
        assert_eq!(first.average_ms, Latency::Absent);
        let second = MeasurementRow::from_raw(&rows[1]);
        assert_eq!(second.n, None);
        assert_eq!(second.average_ms, Latency::Valid(12.5));
    }

    #[test]
    fn csv_tolerates_short_rows() {
        let data = "src_country,dst_country,average_ms\nUS,DE\n";
        let rows = read_csv(data.as_bytes()).unwrap();
        assert_eq!(rows[0].average_ms, None);
        assert_eq!(rows[0].dst_country.as_deref(), Some("DE"));
    }

    #[test]
    fn jsonl_accepts_numbers_and_strings() {
        let data = "{\"src_country\":\"US\",\"dst_country\":\"DE\",\"n\":12,\"p50_ms\":-1,\"mean_ms\":\"41.5\"}\n\
                    \n\
                    not json\n\
                    {\"src_country\":\"US\",\"dst_country\":\"FR\",\"average_ms\":null}\n";
        let rows = read_jsonl(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        let first = MeasurementRow::from_raw(&rows[0]);
        assert_eq!(first.n, Some(12.0));
        assert_eq!(first.p50_ms, Latency::Invalid);
        assert_eq!(first.mean_ms, Latency::Valid(41.5));
        assert_eq!(rows[1].average_ms, None);
    }

    #[test]
    fn features_read_codes_and_names() {
        let data = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"ISO_A2":"de","NAME":"Germany"},"geometry":null},
            {"type":"Feature","properties":{"ISO_A2":"-99","iso_a2":"FR","ADMIN":"France"},"geometry":null},
            {"type":"Feature","properties":{"name":"Nowhere"},"geometry":null},
            {"type":"Feature","geometry":null}
        ]}"#;
        let features = read_features(data.as_bytes()).unwrap();
        assert_eq!(
            features,
            vec![
                Feature {
                    code: "DE".to_string(),
                    name: "Germany".to_string(),
                },
                Feature {
                    code: "FR".to_string(),
                    name: "France".to_string(),
                },
                Feature {
                    code: String::new(),
                    name: "Nowhere".to_string(),
                },
                Feature {
                    code: String::new(),
                    name: String::new(),
                },
            ]
        );
    }

    #[test]
    fn non_collection_geography_is_an_error() {
        let err = read_features("{\"type\":\"Feature\"}".as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Geography(_)));
        assert!(read_features("nope".as_bytes()).is_err());
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let err = load_rows("/nonexistent/latmap/rows.csv").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
