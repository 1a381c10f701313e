//! End-to-end scenarios: files on disk in, operational status out.

use std::fs;
use std::path::Path;

use assyntrax::config::Config;
use assyntrax::data::LayerKind;
use assyntrax::gate::OperationalStatus;
use assyntrax::payload::{build_asset_payload, build_layers, PayloadError};
use assyntrax::regime::{Regime, RegimeSourceKind};
use chrono::{Duration, NaiveDate};
use serde_json::json;
use tempfile::TempDir;

fn setup() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    let cfg = Config::rooted(dir.path());
    for d in [&cfg.core_dir, &cfg.normalized_dir, &cfg.regimes_dir(), &cfg.hmm_dir()] {
        fs::create_dir_all(d).unwrap();
    }
    (dir, cfg)
}

/// `n` points spread evenly over `days` days starting 2018-01-01.
fn spread_dates(n: usize, days: i64) -> Vec<String> {
    let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
    (0..n)
        .map(|i| {
            let offset = if n > 1 { i as i64 * days / (n as i64 - 1) } else { 0 };
            (start + Duration::days(offset)).format("%Y-%m-%d").to_string()
        })
        .collect()
}

fn write_core(path: &Path, dates: &[String]) {
    let mut out = String::from("date,P,L,J,D\n");
    for (i, d) in dates.iter().enumerate() {
        out.push_str(&format!("{},{},{},{},\n", d, 100.0 + i as f64 * 0.1, 50.0, 0.1075));
    }
    fs::write(path, out).unwrap();
}

/// Risky state 1 for `risky` rows, then safe state 0 for `safe` rows.
fn write_hmm(path: &Path, risky: usize, safe: usize, safe_prob: f64) {
    let mut sequence = vec![1; risky];
    sequence.extend(vec![0; safe]);
    let probabilities: Vec<Vec<f64>> = sequence
        .iter()
        .map(|s| if *s == 0 { vec![safe_prob, 1.0 - safe_prob] } else { vec![0.2, 0.8] })
        .collect();
    let payload = json!({
        "sequence": sequence,
        "probabilities": probabilities,
        "means": [[0.01, 0.02], [-0.02, 0.30]],
        "states": 2,
    });
    fs::write(path, payload.to_string()).unwrap();
}

#[tokio::test]
async fn scenario_adequate_core_with_settled_stable_state_validates() {
    let (_dir, cfg) = setup();
    let dates = spread_dates(400, 1461);
    write_core(&cfg.core_dir.join("SAO_PAULO_core.csv"), &dates);
    write_hmm(&cfg.hmm_dir().join("SAO_PAULO_hmm.json"), 30, 10, 0.8);

    let payload = build_asset_payload(&cfg, Some("SAO_PAULO")).await.unwrap();

    let profile = &payload.data.profile;
    assert_eq!(payload.data.source, LayerKind::Core);
    assert_eq!(profile.n_points, 400);
    assert_eq!(profile.gap_ratio, 0.0);
    assert!(profile.coverage_years >= 3.99);
    assert!(profile.required_fields.p && profile.required_fields.l && profile.required_fields.j);
    assert!(!profile.required_fields.d);

    assert_eq!(payload.dynamic.source, RegimeSourceKind::Hmm);
    assert_eq!(payload.dynamic.rows.len(), 40);
    assert_eq!(payload.dynamic.rows.last().unwrap().date, *dates.last().unwrap());
    assert_eq!(payload.dynamic.rows[29].regime, Regime::Unstable);
    assert_eq!(payload.dynamic.rows[30].regime, Regime::Stable);
    assert!(payload.dynamic.rows[30].transition);

    let op = &payload.operational;
    assert!(op.adequacy_ok);
    assert_eq!(op.status, OperationalStatus::Validated);
    assert_eq!(op.raw_status, Some(OperationalStatus::Validated));
    let latest = op.latest.as_ref().unwrap();
    assert_eq!(latest.regime, Regime::Stable);
    assert_eq!(latest.persistence, 10);
    assert!(latest.confidence >= 0.7);

    assert_eq!(payload.assets, vec!["SAO_PAULO"]);
    assert_eq!(payload.assets_meta["SAO_PAULO"].state.as_deref(), Some("SP"));
}

#[tokio::test]
async fn scenario_stable_state_shorter_than_window_does_not_validate() {
    let (_dir, cfg) = setup();
    write_core(&cfg.core_dir.join("RECIFE_core.csv"), &spread_dates(400, 1461));
    write_hmm(&cfg.hmm_dir().join("RECIFE_hmm.json"), 30, 2, 0.8);

    let (_, dynamic, op) = build_layers(&cfg, "RECIFE").await;
    assert_eq!(dynamic.rows.last().unwrap().regime, Regime::Stable);
    assert_eq!(op.raw_status, Some(OperationalStatus::Validated));
    assert_eq!(op.status, OperationalStatus::Watch);
}

#[tokio::test]
async fn scenario_short_series_is_inconclusive() {
    let (_dir, cfg) = setup();
    write_core(&cfg.core_dir.join("NATAL_core.csv"), &spread_dates(50, 1461));
    write_hmm(&cfg.hmm_dir().join("NATAL_hmm.json"), 0, 20, 0.95);

    let (data, dynamic, op) = build_layers(&cfg, "NATAL").await;
    assert_eq!(data.profile.n_points, 50);
    assert!(!dynamic.rows.is_empty());
    assert!(!op.adequacy_ok);
    assert_eq!(op.status, OperationalStatus::Inconclusive);
    assert!(op.explanation.to_lowercase().contains("insufficient data"));
}

#[tokio::test]
async fn scenario_no_files_yields_empty_layers() {
    let (_dir, cfg) = setup();
    write_core(&cfg.core_dir.join("OTHER_core.csv"), &spread_dates(10, 300));

    let payload = build_asset_payload(&cfg, Some("GHOST")).await.unwrap();
    assert_eq!(payload.data.source, LayerKind::Empty);
    assert_eq!(payload.data.profile.n_points, 0);
    assert_eq!(payload.data.profile.gap_ratio, 1.0);
    assert!(payload.data.sources.is_empty());
    assert!(payload.dynamic.rows.is_empty());
    assert_eq!(payload.dynamic.source, RegimeSourceKind::None);
    assert_eq!(payload.operational.status, OperationalStatus::Inconclusive);
    assert!(payload.operational.latest.is_none());

    let body = serde_json::to_value(&payload).unwrap();
    assert!(body["operational"]["latest"].is_null());
    assert_eq!(body["operational"]["status"], "inconclusive");
}

#[tokio::test]
async fn pipeline_csv_wins_over_hmm_and_falls_back_to_confidence() {
    let (_dir, cfg) = setup();
    write_core(&cfg.core_dir.join("CURITIBA_core.csv"), &spread_dates(400, 1461));
    write_hmm(&cfg.hmm_dir().join("CURITIBA_hmm.json"), 0, 10, 0.9);
    let mut csv = String::from("date,regime,confidence\n");
    for m in 1..=12 {
        csv.push_str(&format!("2021-{:02},{},0.65\n", m, if m < 6 { "UNSTABLE" } else { "STABLE" }));
    }
    fs::write(cfg.regimes_dir().join("CURITIBA_monthly_regimes.csv"), csv).unwrap();

    let (_, dynamic, op) = build_layers(&cfg, "CURITIBA").await;
    assert_eq!(dynamic.source, RegimeSourceKind::PipelineCsv);
    assert_eq!(dynamic.rows.len(), 12);
    assert!(dynamic.rows.iter().all(|r| r.quality == 0.0 && r.entropy == 0.0));
    // quality falls back to confidence (0.65): watch, not validated
    assert_eq!(op.status, OperationalStatus::Watch);
}

#[tokio::test]
async fn normalized_layout_aligns_rate_series() {
    let (_dir, cfg) = setup();
    let dates = spread_dates(300, 1461);
    let mut prices = String::from("date,value\n");
    for (i, d) in dates.iter().enumerate() {
        prices.push_str(&format!("{},{}\n", d, 200.0 + i as f64));
    }
    fs::write(cfg.normalized_dir.join("GOIANIA.csv"), prices).unwrap();
    fs::write(
        cfg.normalized_dir.join("SELIC_D_11.csv"),
        "date,value\n2017-12-01,7.0\n2019-06-01,6.5\n2020-08-01,2.0\n",
    )
    .unwrap();

    let (data, _, op) = build_layers(&cfg, "GOIANIA").await;
    assert_eq!(data.source, LayerKind::Normalized);
    assert_eq!(data.series.j.len(), data.series.p.len());
    assert_eq!(data.series.j[0].value, 7.0);
    assert_eq!(data.series.j.last().unwrap().value, 2.0);
    assert!(!data.profile.required_fields.l);
    assert_eq!(data.sources.len(), 2);
    assert!(op.adequacy_ok);
    assert_eq!(op.status, OperationalStatus::Inconclusive);
    assert!(op.explanation.contains("No model regimes"));
}

#[tokio::test]
async fn empty_catalog_is_an_error() {
    let (_dir, cfg) = setup();
    assert!(matches!(build_asset_payload(&cfg, None).await, Err(PayloadError::NoAssets)));
    assert!(matches!(
        build_asset_payload(&cfg, Some("../secrets")).await,
        Err(PayloadError::InvalidAsset(_))
    ));
}

#[tokio::test]
async fn repeated_requests_are_identical() {
    let (_dir, cfg) = setup();
    write_core(&cfg.core_dir.join("BELEM_core.csv"), &spread_dates(250, 1200));
    write_hmm(&cfg.hmm_dir().join("BELEM_hmm.json"), 5, 5, 0.75);

    let a = serde_json::to_value(build_asset_payload(&cfg, None).await.unwrap()).unwrap();
    let b = serde_json::to_value(build_asset_payload(&cfg, None).await.unwrap()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a["asset"], "BELEM");
}
