use serde::{Deserialize, Serialize};

use super::{parse_date, Point, SeriesSet};

/// Gaps longer than this between consecutive P points count against quality.
pub const GAP_THRESHOLD_DAYS: i64 = 35;
pub const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequiredFields {
    #[serde(rename = "P")]
    pub p: bool,
    #[serde(rename = "L")]
    pub l: bool,
    #[serde(rename = "J")]
    pub j: bool,
    #[serde(rename = "D")]
    pub d: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub n_points: usize,
    pub coverage_years: f64,
    pub gap_ratio: f64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub required_fields: RequiredFields,
    pub notes: Vec<String>,
}

fn has_finite(series: &[Point]) -> bool {
    series.iter().any(|p| p.value.is_finite())
}

/// Coverage and gap statistics over the P series.
///
/// Fewer than two points means zero coverage and a gap ratio of 1.0, the
/// most distrustful value.
pub fn build_profile(series: &SeriesSet, loader_notes: &[String]) -> Profile {
    let dates: Vec<_> = series.p.iter().filter_map(|p| parse_date(&p.date)).collect();
    let n_points = dates.len();

    let (coverage_years, gap_ratio) = if n_points < 2 {
        (0.0, 1.0)
    } else {
        let span = (dates[n_points - 1] - dates[0]).num_days();
        let gaps = dates
            .windows(2)
            .filter(|w| (w[1] - w[0]).num_days() > GAP_THRESHOLD_DAYS)
            .count();
        (span as f64 / DAYS_PER_YEAR, gaps as f64 / (n_points - 1) as f64)
    };

    let required_fields = RequiredFields {
        p: has_finite(&series.p),
        l: has_finite(&series.l),
        j: has_finite(&series.j),
        d: has_finite(&series.d),
    };

    let mut notes = loader_notes.to_vec();
    for (name, present) in [
        ("P", required_fields.p),
        ("L", required_fields.l),
        ("J", required_fields.j),
        ("D", required_fields.d),
    ] {
        if !present {
            notes.push(format!("series {} has no valid points", name));
        }
    }

    Profile {
        n_points,
        coverage_years,
        gap_ratio,
        start_date: series.p.first().map(|p| p.date.clone()),
        end_date: series.p.last().map(|p| p.date.clone()),
        required_fields,
        notes,
    }
}
