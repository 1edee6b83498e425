// =============================================================================
// Tabular value envelope (C3)
// =============================================================================
//
// OHLCV bars and key->numeric-series data don't round-trip cleanly through
// plain JSON (column order, date-vs-string index), so they get a tagged
// envelope instead: `{__tabular_type__: "frame"|"series", index, columns?,
// data}`. Hand-rolled against `serde_json::Value` rather than a derived
// `Serialize` impl — the tag placement and the "columns only for frame"
// shape don't map onto a single derive.
// =============================================================================

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::types::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub enum TabularValue {
    /// An ordered sequence of OHLCV bars: one row per date, one column per
    /// field.
    Frame {
        index: Vec<String>,
        columns: Vec<String>,
        data: Vec<Vec<Value>>,
    },
    /// A single numeric series keyed by date (e.g. a daily indicator value).
    Series {
        index: Vec<String>,
        data: Vec<Value>,
    },
}

const TAG_KEY: &str = "__tabular_type__";

impl TabularValue {
    pub fn to_json(&self) -> Value {
        match self {
            TabularValue::Frame { index, columns, data } => json!({
                TAG_KEY: "frame",
                "index": index,
                "columns": columns,
                "data": data,
            }),
            TabularValue::Series { index, data } => json!({
                TAG_KEY: "series",
                "index": index,
                "data": data,
            }),
        }
    }

    /// Detect and parse the tagged envelope. Returns `None` if `value`
    /// doesn't carry the tag (the caller should treat it as a plain JSON
    /// value instead — per spec.md §4.3, "without the tag, the raw decoded
    /// value is returned").
    pub fn from_json(value: &Value) -> Option<TabularValue> {
        let tag = value.get(TAG_KEY)?.as_str()?;
        let index = value
            .get("index")?
            .as_array()?
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect();

        match tag {
            "frame" => {
                let columns = value
                    .get("columns")?
                    .as_array()?
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect();
                let data = value
                    .get("data")?
                    .as_array()?
                    .iter()
                    .map(|row| row.as_array().cloned().unwrap_or_default())
                    .collect();
                Some(TabularValue::Frame { index, columns, data })
            }
            "series" => {
                let data = value.get("data")?.as_array()?.clone();
                Some(TabularValue::Series { index, data })
            }
            _ => None,
        }
    }
}

/// Convert an ordered bar sequence into the tagged frame envelope. NaN
/// values (shouldn't occur in real bars, but a defensive convert-to-null
/// keeps the envelope a valid JSON document) become `null` per spec.md
/// §4.3.
pub fn bars_to_tabular(bars: &[OhlcvBar]) -> TabularValue {
    let columns = vec![
        "open".to_string(),
        "high".to_string(),
        "low".to_string(),
        "close".to_string(),
        "volume".to_string(),
    ];
    let index = bars.iter().map(|b| b.date.to_string()).collect();
    let data = bars
        .iter()
        .map(|b| {
            vec![
                num_or_null(b.open),
                num_or_null(b.high),
                num_or_null(b.low),
                num_or_null(b.close),
                json!(b.volume),
            ]
        })
        .collect();

    TabularValue::Frame { index, columns, data }
}

/// Inverse of [`bars_to_tabular`]. Returns `None` if the frame's columns
/// don't match the expected OHLCV shape.
pub fn tabular_to_bars(value: &TabularValue) -> Option<Vec<OhlcvBar>> {
    let TabularValue::Frame { index, columns, data } = value else {
        return None;
    };

    let col_index = |name: &str| columns.iter().position(|c| c == name);
    let (oi, hi, li, ci, vi) = (
        col_index("open")?,
        col_index("high")?,
        col_index("low")?,
        col_index("close")?,
        col_index("volume")?,
    );

    index
        .iter()
        .zip(data.iter())
        .map(|(date_str, row)| {
            Some(OhlcvBar {
                date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?,
                open: row.get(oi)?.as_f64()?,
                high: row.get(hi)?.as_f64()?,
                low: row.get(li)?.as_f64()?,
                close: row.get(ci)?.as_f64()?,
                volume: row.get(vi)?.as_u64()?,
            })
        })
        .collect()
}

fn num_or_null(x: f64) -> Value {
    if x.is_nan() {
        Value::Null
    } else {
        json!(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bars() -> Vec<OhlcvBar> {
        vec![
            OhlcvBar {
                date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                open: 100.0,
                high: 105.0,
                low: 99.0,
                close: 103.0,
                volume: 1_000,
            },
            OhlcvBar {
                date: NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
                open: 103.0,
                high: 110.0,
                low: 102.0,
                close: 108.0,
                volume: 1_500,
            },
        ]
    }

    #[test]
    fn frame_round_trips_through_json() {
        let bars = sample_bars();
        let tabular = bars_to_tabular(&bars);
        let json = tabular.to_json();
        assert_eq!(json[TAG_KEY], "frame");

        let parsed = TabularValue::from_json(&json).expect("tag must be detected");
        let round_tripped = tabular_to_bars(&parsed).expect("columns must match");
        assert_eq!(round_tripped, bars);
    }

    #[test]
    fn untagged_json_is_not_detected_as_tabular() {
        let plain = json!({"foo": "bar"});
        assert!(TabularValue::from_json(&plain).is_none());
    }

    #[test]
    fn nan_becomes_null() {
        assert_eq!(num_or_null(f64::NAN), Value::Null);
        assert_eq!(num_or_null(1.5), json!(1.5));
    }

    #[test]
    fn series_round_trips() {
        let series = TabularValue::Series {
            index: vec!["2026-01-02".to_string(), "2026-01-03".to_string()],
            data: vec![json!(55.2), json!(60.1)],
        };
        let json = series.to_json();
        assert_eq!(json[TAG_KEY], "series");
        let parsed = TabularValue::from_json(&json).unwrap();
        assert_eq!(parsed, series);
    }
}
