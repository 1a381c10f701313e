//! Operational gate.
//!
//! Every regime row gets a raw status from the policy thresholds; the raw
//! sequence is then debounced by `Hysteresis` so a status only changes after
//! the new value has held for `hysteresis_days` consecutive rows. The gate is
//! total: bad or missing input degrades to `Inconclusive`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::data::Profile;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::regime::{DynamicLayer, DynamicRow, Regime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalStatus {
    Validated,
    Watch,
    Inconclusive,
}

impl OperationalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalStatus::Validated => "validated",
            OperationalStatus::Watch => "watch",
            OperationalStatus::Inconclusive => "inconclusive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub min_points: usize,
    pub min_coverage_years: f64,
    pub max_gap_ratio: f64,
    pub validated_quality: f64,
    pub validated_confidence: f64,
    pub watch_quality: f64,
    pub watch_confidence: f64,
    pub hysteresis_days: u32,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            min_points: 200,
            min_coverage_years: 3.0,
            max_gap_ratio: 0.12,
            validated_quality: 0.70,
            validated_confidence: 0.60,
            watch_quality: 0.55,
            watch_confidence: 0.45,
            hysteresis_days: 3,
        }
    }
}

impl GatePolicy {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_points: std::env::var("GATE_MIN_POINTS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.min_points),
            min_coverage_years: std::env::var("GATE_MIN_COVERAGE_YEARS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.min_coverage_years),
            max_gap_ratio: std::env::var("GATE_MAX_GAP_RATIO").ok().and_then(|v| v.parse().ok()).unwrap_or(d.max_gap_ratio),
            validated_quality: std::env::var("GATE_VALIDATED_QUALITY").ok().and_then(|v| v.parse().ok()).unwrap_or(d.validated_quality),
            validated_confidence: std::env::var("GATE_VALIDATED_CONFIDENCE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.validated_confidence),
            watch_quality: std::env::var("GATE_WATCH_QUALITY").ok().and_then(|v| v.parse().ok()).unwrap_or(d.watch_quality),
            watch_confidence: std::env::var("GATE_WATCH_CONFIDENCE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.watch_confidence),
            hysteresis_days: std::env::var("GATE_HYSTERESIS_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.hysteresis_days),
        }
    }

    pub fn adequacy_ok(&self, profile: &Profile) -> bool {
        profile.n_points >= self.min_points
            && profile.coverage_years >= self.min_coverage_years
            && profile.gap_ratio <= self.max_gap_ratio
    }

    /// Raw status of one row, assuming the data is adequate.
    ///
    /// Pipeline rows carry no quality, so confidence stands in for it.
    pub fn row_status(&self, row: &DynamicRow) -> OperationalStatus {
        let q = if row.quality > 0.0 { row.quality } else { row.confidence };
        if q >= self.validated_quality
            && row.confidence >= self.validated_confidence
            && row.regime == Regime::Stable
        {
            OperationalStatus::Validated
        } else if q >= self.watch_quality && row.confidence >= self.watch_confidence {
            OperationalStatus::Watch
        } else {
            OperationalStatus::Inconclusive
        }
    }
}

// =============================================================================
// Hysteresis
// =============================================================================

/// Debouncer: a new state must repeat `threshold` times in a row before it
/// replaces the current one.
#[derive(Debug, Clone)]
pub struct Hysteresis<S> {
    current: Option<S>,
    candidate: Option<S>,
    streak: u32,
    threshold: u32,
}

impl<S: Copy + PartialEq> Hysteresis<S> {
    pub fn new(threshold: u32) -> Self {
        Self {
            current: None,
            candidate: None,
            streak: 0,
            threshold,
        }
    }

    pub fn current(&self) -> Option<S> {
        self.current
    }

    pub fn step(&mut self, raw: S) -> S {
        let current = match self.current {
            None => {
                self.current = Some(raw);
                return raw;
            }
            Some(current) => current,
        };
        if raw == current {
            self.candidate = None;
            self.streak = 0;
            return current;
        }
        if self.candidate == Some(raw) {
            self.streak += 1;
        } else {
            self.candidate = Some(raw);
            self.streak = 1;
        }
        if self.streak >= self.threshold {
            self.current = Some(raw);
            self.candidate = None;
            self.streak = 0;
            return raw;
        }
        current
    }
}

/// Smoothed sequence, same length as `raw`.
pub fn smooth<S: Copy + PartialEq>(raw: &[S], threshold: u32) -> Vec<S> {
    let mut fsm = Hysteresis::new(threshold);
    raw.iter().map(|s| fsm.step(*s)).collect()
}

// =============================================================================
// Operational layer
// =============================================================================

const EXPLAIN_INADEQUATE: &str = "Insufficient data: the series does not meet the minimum point count, coverage or gap-ratio requirements, so the diagnosis is inconclusive.";
const EXPLAIN_NO_REGIMES: &str = "No model regimes are available for this asset, so the diagnosis is inconclusive.";
const EXPLAIN_VALIDATED: &str = "Stable regime with adequate quality and confidence held through the hysteresis window; the diagnosis is validated.";
const EXPLAIN_WATCH: &str = "Quality and confidence are moderate or the regime is not stable; the asset is under watch.";
const EXPLAIN_INCONCLUSIVE: &str = "Quality or confidence is below the operational thresholds, so the diagnosis is inconclusive.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestRow {
    pub date: String,
    pub regime: Regime,
    pub confidence: f64,
    pub quality: f64,
    pub persistence: u32,
    pub instability_score: f64,
}

impl From<&DynamicRow> for LatestRow {
    fn from(row: &DynamicRow) -> Self {
        Self {
            date: row.date.clone(),
            regime: row.regime,
            confidence: row.confidence,
            quality: row.quality,
            persistence: row.persistence,
            instability_score: row.instability_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalLayer {
    pub status: OperationalStatus,
    pub explanation: String,
    pub adequacy_ok: bool,
    pub thresholds: GatePolicy,
    pub raw_status: Option<OperationalStatus>,
    pub latest: Option<LatestRow>,
}

fn explain(adequacy_ok: bool, has_rows: bool, status: OperationalStatus) -> &'static str {
    if !adequacy_ok {
        EXPLAIN_INADEQUATE
    } else if !has_rows {
        EXPLAIN_NO_REGIMES
    } else {
        match status {
            OperationalStatus::Validated => EXPLAIN_VALIDATED,
            OperationalStatus::Watch => EXPLAIN_WATCH,
            OperationalStatus::Inconclusive => EXPLAIN_INCONCLUSIVE,
        }
    }
}

pub fn evaluate(profile: &Profile, dynamic: &DynamicLayer, policy: &GatePolicy) -> OperationalLayer {
    let adequacy_ok = policy.adequacy_ok(profile);
    let raw: Vec<OperationalStatus> = dynamic
        .rows
        .iter()
        .map(|row| {
            if adequacy_ok {
                policy.row_status(row)
            } else {
                OperationalStatus::Inconclusive
            }
        })
        .collect();
    let smoothed = smooth(&raw, policy.hysteresis_days);
    let status = smoothed.last().copied().unwrap_or(OperationalStatus::Inconclusive);
    let has_rows = !dynamic.rows.is_empty();

    log(
        Level::Info,
        Domain::Gate,
        "gate_evaluated",
        obj(&[
            ("status", v_str(status.as_str())),
            ("adequacy_ok", json!(adequacy_ok)),
            ("rows", json!(raw.len())),
            ("raw_status", json!(raw.last().map(|s| s.as_str()))),
        ]),
    );

    OperationalLayer {
        status,
        explanation: explain(adequacy_ok, has_rows, status).to_string(),
        adequacy_ok,
        thresholds: *policy,
        raw_status: raw.last().copied(),
        latest: dynamic.rows.last().map(LatestRow::from),
    }
}
