//! Series primitives shared by the loaders, the profile builder and the
//! regime strategies: strict date normalization, lenient number parsing,
//! a small header-aware CSV reader and file fingerprints.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub mod loader;
pub mod profile;

pub use loader::{build_data_layer, CoreCsvSource, LayerSource, NormalizedSource, SeriesBundle};
pub use profile::{build_profile, Profile, RequiredFields};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub date: String,
    pub value: f64,
}

impl Point {
    pub fn new(date: impl Into<String>, value: f64) -> Self {
        Self { date: date.into(), value }
    }
}

/// The four series of one entity: price level, liquidity proxy,
/// rate/financing cost and the optional discount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSet {
    #[serde(rename = "P")]
    pub p: Vec<Point>,
    #[serde(rename = "L")]
    pub l: Vec<Point>,
    #[serde(rename = "J")]
    pub j: Vec<Point>,
    #[serde(rename = "D")]
    pub d: Vec<Point>,
}

impl SeriesSet {
    pub fn sort(&mut self) {
        for series in [&mut self.p, &mut self.l, &mut self.j, &mut self.d] {
            sort_points(series);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.p.is_empty() && self.l.is_empty() && self.j.is_empty() && self.d.is_empty()
    }
}

/// Which file layout produced a data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Core,
    Normalized,
    Empty,
}

/// Content fingerprint of a file that fed a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLayer {
    pub asset: String,
    pub source: LayerKind,
    pub series: SeriesSet,
    pub profile: Profile,
    pub sources: Vec<SourceRef>,
}

// =============================================================================
// Dates and numbers
// =============================================================================

/// Parse `YYYY-MM-DD`, or `YYYY-MM` as the first of that month.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = unquote(raw);
    let parts: Vec<&str> = s.split('-').collect();
    let (y, m, d) = match parts.as_slice() {
        [y, m] => (*y, *m, "01"),
        [y, m, d] => (*y, *m, *d),
        _ => return None,
    };
    if y.len() != 4 || m.len() != 2 || d.len() != 2 {
        return None;
    }
    if ![y, m, d].iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

pub fn format_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// Canonical `YYYY-MM-DD` form of a date cell, or `None` if it does not parse.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(format_date)
}

/// Finite number from a cell; blanks, `NaN` and infinities are missing.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = unquote(raw);
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

pub fn sort_points(points: &mut [Point]) {
    points.sort_by(|a, b| a.date.cmp(&b.date));
}

pub fn clamp01(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Header plus raw cells. Blank lines and `#` comments are skipped.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(text: &str) -> Self {
        let mut table = CsvTable::default();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let cells: Vec<String> = trimmed
                .split(',')
                .map(|s| unquote(s).to_string())
                .collect();
            if table.header.is_empty() {
                table.header = cells
                    .into_iter()
                    .map(|c| c.trim_start_matches('\u{feff}').to_string())
                    .collect();
            } else {
                table.rows.push(cells);
            }
        }
        table
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn cell<'a>(&self, row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
        idx.and_then(|i| row.get(i)).map(String::as_str)
    }

    /// Points for one value column; rows with a bad date or value are dropped.
    pub fn points(&self, date_col: usize, value_col: usize) -> Vec<Point> {
        let mut out: Vec<Point> = self
            .rows
            .iter()
            .filter_map(|row| {
                let date = normalize_date(row.get(date_col)?)?;
                let value = parse_number(row.get(value_col)?)?;
                Some(Point { date, value })
            })
            .collect();
        sort_points(&mut out);
        out
    }
}

// =============================================================================
// File access
// =============================================================================

/// Read a text file and fingerprint its bytes.
pub async fn read_source(path: &Path) -> Result<(String, SourceRef)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let sha256 = hex::encode(Sha256::digest(&bytes));
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok((
        text,
        SourceRef {
            path: path.display().to_string(),
            sha256,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_full_and_month_dates() {
        assert_eq!(normalize_date("2021-03-15").as_deref(), Some("2021-03-15"));
        assert_eq!(normalize_date("2021-03").as_deref(), Some("2021-03-01"));
        assert_eq!(normalize_date(" \"2021-03-15\" ").as_deref(), Some("2021-03-15"));
    }

    #[test]
    fn rejects_loose_dates() {
        for raw in ["2021-3-15", "21-03-15", "2021/03/15", "2021-02-30", "2021-13", "", "2021-03-15T00:00:00", "abcd-ef-gh"] {
            assert_eq!(normalize_date(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["2020-01-31", "1999-12", "2024-02-29", "2000-06"] {
            let once = normalize_date(raw).unwrap();
            assert_eq!(normalize_date(&once).as_deref(), Some(once.as_str()));
        }
    }

    #[test]
    fn numbers_must_be_finite() {
        assert_eq!(parse_number(" 1.5 "), Some(1.5));
        assert_eq!(parse_number("\"-2\""), Some(-2.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn csv_table_matches_headers_case_insensitively() {
        let table = CsvTable::parse("\u{feff}Date,Value\n# comment\n\n2020-02,2\n2020-01,1\nbad,3\n2020-03,\n");
        assert_eq!(table.column("date"), Some(0));
        assert_eq!(table.column("VALUE"), Some(1));
        assert_eq!(table.column("missing"), None);
        let pts = table.points(0, 1);
        assert_eq!(pts, vec![Point::new("2020-01-01", 1.0), Point::new("2020-02-01", 2.0)]);
    }

    #[test]
    fn clamp01_maps_non_finite_to_zero() {
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(-0.2), 0.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(0.4), 0.4);
    }
}
