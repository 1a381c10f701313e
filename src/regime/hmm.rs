//! HMM relabeling.
//!
//! Hidden states carry no meaning of their own. Each state is scored by
//! `|mean_volatility| - mean_return`; the safest state becomes STABLE, the
//! riskiest UNSTABLE and everything in between TRANSITION.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use super::{Regime, RegimeObservation, RegimeSource, RegimeSourceKind};
use crate::data::{clamp01, normalize_date, read_source};
use crate::logging::{log, obj, v_str, Domain, Level};

/// Upper bound on hidden states taken from a payload. Larger counts are
/// clamped; sequence ids at or beyond the bound become inconclusive rows.
pub const MAX_HMM_STATES: usize = 64;

/// Confidence used when the probability matrix has no usable entry.
pub fn fallback_confidence(regime: Regime) -> f64 {
    match regime {
        Regime::Stable => 0.68,
        Regime::Transition => 0.56,
        Regime::Unstable => 0.62,
        Regime::Inconclusive => 0.0,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HmmPayload {
    #[serde(default)]
    pub sequence: Vec<i64>,
    #[serde(default)]
    pub probabilities: Vec<Option<Vec<Option<f64>>>>,
    #[serde(default)]
    pub means: Vec<Vec<Option<f64>>>,
    #[serde(default)]
    pub states: Option<usize>,
    #[serde(default)]
    pub dates: Option<Vec<String>>,
}

impl HmmPayload {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse hmm payload")
    }

    pub fn state_count(&self) -> usize {
        let from_sequence = self
            .sequence
            .iter()
            .filter(|s| **s >= 0)
            .max()
            .map(|s| usize::try_from(*s).unwrap_or(usize::MAX).saturating_add(1))
            .unwrap_or(0);
        self.states
            .unwrap_or(0)
            .max(self.means.len())
            .max(from_sequence)
            .min(MAX_HMM_STATES)
    }

    fn risk(&self, state: usize) -> f64 {
        let mean = |i: usize| {
            self.means
                .get(state)
                .and_then(|m| m.get(i).copied().flatten())
                .filter(|v| v.is_finite())
        };
        match (mean(0), mean(1)) {
            (Some(ret), Some(vol)) => vol.abs() - ret,
            _ => f64::INFINITY,
        }
    }

    fn probability(&self, t: usize, state: usize) -> Option<f64> {
        self.probabilities
            .get(t)
            .and_then(|row| row.as_ref())
            .and_then(|row| row.get(state).copied().flatten())
            .filter(|p| p.is_finite())
    }

    /// Relabel the sequence against the given dates.
    ///
    /// Dates embedded in the payload win; otherwise the sequence is aligned to
    /// the tail of `fallback_dates`.
    pub fn observations(&self, fallback_dates: &[String]) -> Vec<RegimeObservation> {
        let labels = relabel_states(self, self.state_count());
        let indexed: Vec<(usize, String)> = match &self.dates {
            Some(dates) => dates
                .iter()
                .take(self.sequence.len())
                .enumerate()
                .filter_map(|(t, d)| normalize_date(d).map(|d| (t, d)))
                .collect(),
            None => {
                let n = self.sequence.len().min(fallback_dates.len());
                let seq_start = self.sequence.len() - n;
                let date_start = fallback_dates.len() - n;
                (0..n)
                    .map(|i| (seq_start + i, fallback_dates[date_start + i].clone()))
                    .collect()
            }
        };

        indexed
            .into_iter()
            .map(|(t, date)| {
                let state = self.sequence[t];
                let label = usize::try_from(state).ok().and_then(|s| labels.get(s).map(|l| (s, *l)));
                match label {
                    Some((s, regime)) => {
                        let confidence = self
                            .probability(t, s)
                            .map(clamp01)
                            .unwrap_or_else(|| fallback_confidence(regime));
                        RegimeObservation {
                            date,
                            regime,
                            microstate: format!("S{}", s),
                            confidence,
                            quality: confidence,
                            entropy: 1.0 - confidence,
                        }
                    }
                    None => RegimeObservation {
                        date,
                        regime: Regime::Inconclusive,
                        microstate: format!("S{}", state),
                        confidence: 0.0,
                        quality: 0.0,
                        entropy: 1.0,
                    },
                }
            })
            .collect()
    }
}

/// Regime for each of `k` hidden states, indexed by state id.
pub fn relabel_states(payload: &HmmPayload, k: usize) -> Vec<Regime> {
    let k = k.min(MAX_HMM_STATES);
    let mut ranked: Vec<(usize, f64)> = (0..k).map(|s| (s, payload.risk(s))).collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut labels = vec![Regime::Transition; k];
    if let Some((last, _)) = ranked.last() {
        labels[*last] = Regime::Unstable;
    }
    if k >= 3 {
        labels[ranked[k / 2].0] = Regime::Transition;
    }
    if let Some((first, _)) = ranked.first() {
        labels[*first] = Regime::Stable;
    }
    labels
}

/// `{dir}/{asset}_hmm.json`
pub struct HmmSource {
    pub dir: PathBuf,
}

#[async_trait]
impl RegimeSource for HmmSource {
    fn kind(&self) -> RegimeSourceKind {
        RegimeSourceKind::Hmm
    }

    async fn derive(&self, asset: &str, dates: &[String]) -> Option<Vec<RegimeObservation>> {
        let path = self.dir.join(format!("{}_hmm.json", asset));
        let (text, _) = read_source(&path).await.ok()?;
        match HmmPayload::parse(&text) {
            Ok(payload) => Some(payload.observations(dates)),
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Regime,
                    "hmm_payload_invalid",
                    obj(&[
                        ("asset", v_str(asset)),
                        ("path", v_str(&path.display().to_string())),
                        ("error", v_str(&format!("{:#}", err))),
                    ]),
                );
                None
            }
        }
    }
}
