//! Raw table -> cleaned dataset.
//!
//! A reading column is any column whose label embeds a 4-digit year inside
//! the configured range. Only the two identifier columns and the reading
//! columns survive, in sheet order. Missing or unusable cells
//! become 0 and negative readings are clamped to 0.

use crate::config::PreprocessConfig;
use crate::dataset::{Dataset, Facility, ReadingColumn};
use crate::error::{IngestError, IngestResult};
use crate::table::RawTable;
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// Clean `raw` into a dataset. Fails only when an identifier column is absent.
pub fn preprocess(raw: &RawTable, config: &PreprocessConfig) -> IngestResult<Dataset> {
    let meter_col = identifier_column(raw, &config.meter_id_column)?;
    let building_col = identifier_column(raw, &config.building_id_column)?;

    let reading_cols: Vec<(usize, ReadingColumn)> =
        recognize_reading_columns(&raw.headers, config)
            .into_iter()
            .filter(|(idx, _)| *idx != meter_col && *idx != building_col)
            .collect();

    let mut facilities = Vec::with_capacity(raw.len());
    let mut dropped_rows = 0usize;
    let mut coerced_cells = 0usize;

    for row in 0..raw.len() {
        let Some(meter_id) = raw.cell(row, meter_col) else {
            dropped_rows += 1;
            continue;
        };
        let building_id = raw.cell(row, building_col).unwrap_or_default();

        let readings = reading_cols
            .iter()
            .map(|(col, _)| {
                let cell = raw.cell(row, *col);
                let (value, coerced) = clean_reading(cell);
                if coerced {
                    coerced_cells += 1;
                    debug!(row, column = *col, cell = ?cell, "Reading coerced to 0");
                }
                value
            })
            .collect();

        facilities.push(Facility::new(meter_id, building_id, readings));
    }

    if dropped_rows > 0 {
        warn!(dropped_rows, "Rows without a meter id were dropped.");
    }

    let columns: Vec<ReadingColumn> = reading_cols.into_iter().map(|(_, c)| c).collect();
    info!(
        facilities = facilities.len(),
        reading_columns = columns.len(),
        coerced_cells,
        "Dataset preprocessed."
    );

    Ok(Dataset::new(columns, facilities))
}

fn identifier_column(raw: &RawTable, name: &str) -> IngestResult<usize> {
    raw.column_index(name)
        .ok_or_else(|| IngestError::MissingIdentifierColumn {
            column: name.to_string(),
        })
}

/// Reading columns of a header row, with their positions, in order.
pub fn recognize_reading_columns(
    headers: &[String],
    config: &PreprocessConfig,
) -> Vec<(usize, ReadingColumn)> {
    let years = config.years();
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| **h != config.meter_id_column && **h != config.building_id_column)
        .filter_map(|(idx, h)| parse_reading_label(h, &years).map(|c| (idx, c)))
        .collect()
}

/// Recognise a column label carrying a year inside `years`.
pub fn parse_reading_label(label: &str, years: &RangeInclusive<i32>) -> Option<ReadingColumn> {
    let (start, year) = find_year(label, years)?;
    let month = month_after(&label[start + 4..]).or_else(|| month_before(&label[..start]));
    Some(ReadingColumn {
        label: label.to_string(),
        year,
        month,
    })
}

fn find_year(label: &str, years: &RangeInclusive<i32>) -> Option<(usize, i32)> {
    let bytes = label.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    (0..=bytes.len() - 4).find_map(|start| {
        let window = &bytes[start..start + 4];
        if !window.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let year: i32 = std::str::from_utf8(window).ok()?.parse().ok()?;
        years.contains(&year).then_some((start, year))
    })
}

fn is_separator(c: char) -> bool {
    matches!(c, '/' | '-' | '.' | '_' | ' ')
}

fn month_after(rest: &str) -> Option<u32> {
    let rest = rest.strip_prefix(is_separator).unwrap_or(rest);
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    parse_month(&digits)
}

fn month_before(head: &str) -> Option<u32> {
    let head = head.strip_suffix(is_separator)?;
    let mut digits: Vec<char> = head
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.reverse();
    parse_month(&digits.into_iter().collect::<String>())
}

fn parse_month(digits: &str) -> Option<u32> {
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    digits.parse().ok().filter(|m| (1..=12).contains(m))
}

/// Returns the cleaned value and whether the cell had to be coerced.
fn clean_reading(cell: Option<&str>) -> (f64, bool) {
    let Some(raw) = cell else {
        return (0.0, false);
    };
    let parsed = raw
        .parse::<f64>()
        .or_else(|_| raw.replace(',', ".").parse::<f64>());
    match parsed {
        Ok(v) if v.is_finite() && v > 0.0 => (v, false),
        Ok(v) if v.is_finite() => (0.0, v < 0.0),
        _ => (0.0, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::load_table;

    const SAMPLE_CSV: &str = "\
TN,BN,Abone Adi,2016/1,2016/2,Notlar,2026/1,2017/1
1001,B1,Ayse,120,-5,x,999,abc
1002,B1,Mehmet,,80,y,999,12.5
,B2,Nobody,1,1,z,1,1
1003,,Orphan,\"7,5\",0,w,1,1
";

    fn years() -> RangeInclusive<i32> {
        2016..=2025
    }

    #[test]
    fn test_year_token_recognition() {
        assert!(parse_reading_label("2016/1", &years()).is_some());
        assert!(parse_reading_label("Ocak 2025", &years()).is_some());
        assert!(parse_reading_label("2015/12", &years()).is_none());
        assert!(parse_reading_label("2026/1", &years()).is_none());
        assert!(parse_reading_label("TN", &years()).is_none());
        assert!(parse_reading_label("201", &years()).is_none());
    }

    #[test]
    fn test_month_extraction() {
        let m = |label: &str| parse_reading_label(label, &years()).and_then(|c| c.month);
        assert_eq!(m("2016/1"), Some(1));
        assert_eq!(m("2016-12"), Some(12));
        assert_eq!(m("201603"), Some(3));
        assert_eq!(m("07.2019"), Some(7));
        assert_eq!(m("Ocak 2016"), None);
        assert_eq!(m("2016/13"), None);
    }

    #[test]
    fn test_preprocess_keeps_identifiers_and_reading_columns() {
        let raw = load_table(SAMPLE_CSV.as_bytes()).unwrap();
        let ds = preprocess(&raw, &PreprocessConfig::default()).unwrap();

        let labels: Vec<&str> = ds.columns().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["2016/1", "2016/2", "2017/1"]);
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn test_preprocess_cleans_cells() {
        let raw = load_table(SAMPLE_CSV.as_bytes()).unwrap();
        let ds = preprocess(&raw, &PreprocessConfig::default()).unwrap();
        let f = ds.facilities();

        // negative clamped, unparseable -> 0
        assert_eq!(f[0].readings, vec![120.0, 0.0, 0.0]);
        // missing -> 0
        assert_eq!(f[1].readings, vec![0.0, 80.0, 12.5]);
        // decimal comma accepted
        assert_eq!(f[2].readings, vec![7.5, 0.0, 1.0]);
        assert!(f.iter().all(|f| f.readings.len() == ds.columns().len()));
    }

    #[test]
    fn test_rows_without_meter_id_dropped_blank_building_kept() {
        let raw = load_table(SAMPLE_CSV.as_bytes()).unwrap();
        let ds = preprocess(&raw, &PreprocessConfig::default()).unwrap();
        let ids: Vec<&str> = ds.facilities().iter().map(|f| f.meter_id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1002", "1003"]);
        assert_eq!(ds.facilities()[2].building_id, "");
        assert_eq!(ds.buildings().members("B1"), &[0, 1]);
    }

    #[test]
    fn test_missing_identifier_is_fatal() {
        let raw = load_table("TN,2016/1\n1,5\n".as_bytes()).unwrap();
        match preprocess(&raw, &PreprocessConfig::default()) {
            Err(IngestError::MissingIdentifierColumn { column }) => assert_eq!(column, "BN"),
            other => panic!("expected missing identifier, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_custom_identifier_names_and_years() {
        let raw = load_table("meter,building,2030-01,2016-01\nm1,b1,4,5\n".as_bytes()).unwrap();
        let config = PreprocessConfig {
            meter_id_column: "meter".into(),
            building_id_column: "building".into(),
            first_year: 2030,
            last_year: 2031,
        };
        let ds = preprocess(&raw, &config).unwrap();
        assert_eq!(ds.columns().len(), 1);
        assert_eq!(ds.facilities()[0].readings, vec![4.0]);
    }

    #[test]
    fn test_no_reading_columns_yields_empty_sequences() {
        let raw = load_table("TN,BN,Adres\n1,A,x\n".as_bytes()).unwrap();
        let ds = preprocess(&raw, &PreprocessConfig::default()).unwrap();
        assert_eq!(ds.len(), 1);
        assert!(ds.facilities()[0].readings.is_empty());
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let raw = load_table(SAMPLE_CSV.as_bytes()).unwrap();
        let a = preprocess(&raw, &PreprocessConfig::default()).unwrap();
        let b = preprocess(&raw, &PreprocessConfig::default()).unwrap();
        assert_eq!(a.facilities(), b.facilities());
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_clean_reading() {
        assert_eq!(clean_reading(None), (0.0, false));
        assert_eq!(clean_reading(Some("12.5")), (12.5, false));
        assert_eq!(clean_reading(Some("-3")), (0.0, true));
        assert_eq!(clean_reading(Some("NaN")), (0.0, true));
        assert_eq!(clean_reading(Some("inf")), (0.0, true));
        assert_eq!(clean_reading(Some("0")), (0.0, false));
    }
}
