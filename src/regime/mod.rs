//! Regime layer.
//!
//! Upstream artifacts come in two shapes: a pipeline CSV that already carries
//! a regime per date, and an HMM payload whose hidden states must be relabeled.
//! Both produce `RegimeObservation`s; `finalize_rows` turns those into
//! `DynamicRow`s with persistence, transition and instability filled in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::data::clamp01;
use crate::logging::{log, obj, v_str, Domain, Level};

pub mod hmm;
pub mod pipeline_csv;

pub use hmm::{relabel_states, HmmPayload, HmmSource};
pub use pipeline_csv::PipelineCsvSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Stable,
    Transition,
    Unstable,
    Inconclusive,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Stable => "STABLE",
            Regime::Transition => "TRANSITION",
            Regime::Unstable => "UNSTABLE",
            Regime::Inconclusive => "INCONCLUSIVE",
        }
    }

    /// Case-insensitive label match; anything unknown is inconclusive.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "STABLE" => Regime::Stable,
            "TRANSITION" => Regime::Transition,
            "UNSTABLE" => Regime::Unstable,
            _ => Regime::Inconclusive,
        }
    }
}

/// One regime decision as delivered by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeObservation {
    pub date: String,
    pub regime: Regime,
    pub microstate: String,
    pub confidence: f64,
    pub quality: f64,
    pub entropy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRow {
    pub date: String,
    pub regime: Regime,
    pub microstate: String,
    pub transition: bool,
    pub confidence: f64,
    pub quality: f64,
    pub entropy: f64,
    pub persistence: u32,
    pub instability_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeSourceKind {
    PipelineCsv,
    Hmm,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicLayer {
    pub source: RegimeSourceKind,
    pub rows: Vec<DynamicRow>,
    pub counts: BTreeMap<Regime, usize>,
}

impl DynamicLayer {
    pub fn empty() -> Self {
        Self {
            source: RegimeSourceKind::None,
            rows: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn from_rows(source: RegimeSourceKind, rows: Vec<DynamicRow>) -> Self {
        let mut counts = BTreeMap::new();
        for row in &rows {
            *counts.entry(row.regime).or_insert(0) += 1;
        }
        Self { source, rows, counts }
    }
}

pub fn instability_score(confidence: f64, quality: f64, entropy: f64) -> f64 {
    clamp01((1.0 - confidence) + (1.0 - quality) + entropy)
}

/// Single forward scan: persistence counts the current run of equal regimes,
/// transition marks the first row of every run after the first.
pub fn finalize_rows(observations: Vec<RegimeObservation>) -> Vec<DynamicRow> {
    let mut rows: Vec<DynamicRow> = Vec::with_capacity(observations.len());
    for obs in observations {
        let (transition, persistence) = match rows.last() {
            Some(prev) if prev.regime == obs.regime => (false, prev.persistence + 1),
            Some(_) => (true, 1),
            None => (false, 1),
        };
        rows.push(DynamicRow {
            instability_score: instability_score(obs.confidence, obs.quality, obs.entropy),
            date: obs.date,
            regime: obs.regime,
            microstate: obs.microstate,
            transition,
            confidence: obs.confidence,
            quality: obs.quality,
            entropy: obs.entropy,
            persistence,
        });
    }
    rows
}

#[async_trait]
pub trait RegimeSource: Send + Sync {
    fn kind(&self) -> RegimeSourceKind;
    /// `dates` are the entity's P dates, for strategies that carry no dates of their own.
    async fn derive(&self, asset: &str, dates: &[String]) -> Option<Vec<RegimeObservation>>;
}

pub fn default_sources(cfg: &Config) -> Vec<Box<dyn RegimeSource>> {
    vec![
        Box::new(PipelineCsvSource { dir: cfg.regimes_dir() }),
        Box::new(HmmSource { dir: cfg.hmm_dir() }),
    ]
}

/// First strategy that produces at least one row wins.
pub async fn derive_dynamic_layer(
    sources: &[Box<dyn RegimeSource>],
    asset: &str,
    dates: &[String],
) -> DynamicLayer {
    for source in sources {
        match source.derive(asset, dates).await {
            Some(observations) if !observations.is_empty() => {
                let layer = DynamicLayer::from_rows(source.kind(), finalize_rows(observations));
                log(
                    Level::Info,
                    Domain::Regime,
                    "regimes_derived",
                    obj(&[
                        ("asset", v_str(asset)),
                        ("source", json!(layer.source)),
                        ("rows", json!(layer.rows.len())),
                        ("latest", json!(layer.rows.last().map(|r| r.regime.as_str()))),
                    ]),
                );
                return layer;
            }
            _ => continue,
        }
    }
    log(
        Level::Warn,
        Domain::Regime,
        "regimes_missing",
        obj(&[("asset", v_str(asset)), ("msg", v_str("no regime strategy produced rows"))]),
    );
    DynamicLayer::empty()
}
