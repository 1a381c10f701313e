//! Series loaders.
//!
//! Each layout is a `LayerSource`; `build_data_layer` tries them in order and
//! keeps the first that produces data. A layout whose files are missing or
//! unreadable simply yields `None`.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};

use super::{build_profile, read_source, CsvTable, DataLayer, LayerKind, Point, SeriesSet, SourceRef};
use crate::config::Config;
use crate::logging::{log, obj, v_str, Domain, Level};

/// Raw output of a loader, before profiling.
#[derive(Debug, Clone)]
pub struct SeriesBundle {
    pub source: LayerKind,
    pub series: SeriesSet,
    pub notes: Vec<String>,
    pub sources: Vec<SourceRef>,
}

impl SeriesBundle {
    pub fn empty() -> Self {
        Self {
            source: LayerKind::Empty,
            series: SeriesSet::default(),
            notes: vec!["no source files found for this asset".to_string()],
            sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait LayerSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self, asset: &str) -> Option<SeriesBundle>;
}

async fn read_table(asset: &str, path: &Path) -> Option<(CsvTable, SourceRef)> {
    match read_source(path).await {
        Ok((text, source)) => Some((CsvTable::parse(&text), source)),
        Err(err) => {
            log(
                Level::Debug,
                Domain::Loader,
                "file_unavailable",
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

fn log_dropped(asset: &str, layout: &str, rows: usize, kept: usize) {
    if rows > kept {
        log(
            Level::Debug,
            Domain::Loader,
            "rows_dropped",
            obj(&[
                ("asset", v_str(asset)),
                ("layout", v_str(layout)),
                ("rows", json!(rows)),
                ("dropped", json!(rows - kept)),
            ]),
        );
    }
}

// =============================================================================
// Core layout: {core_dir}/{asset}_core.csv with date,P,L,J,D
// =============================================================================

pub struct CoreCsvSource {
    pub dir: PathBuf,
}

#[async_trait]
impl LayerSource for CoreCsvSource {
    fn name(&self) -> &'static str {
        "core"
    }

    async fn load(&self, asset: &str) -> Option<SeriesBundle> {
        let path = self.dir.join(format!("{}_core.csv", asset));
        let (table, source) = read_table(asset, &path).await?;
        let date_col = table.column("date")?;
        let column = |name: &str| -> Vec<Point> {
            table
                .column(name)
                .map(|idx| table.points(date_col, idx))
                .unwrap_or_default()
        };
        let mut series = SeriesSet {
            p: column("P"),
            l: column("L"),
            j: column("J"),
            d: column("D"),
        };
        series.sort();
        log_dropped(asset, self.name(), table.rows.len(), series.p.len());
        // P drives every downstream date; a core file without it defers.
        if series.p.is_empty() {
            return None;
        }
        Some(SeriesBundle {
            source: LayerKind::Core,
            series,
            notes: vec!["layout: core csv".to_string()],
            sources: vec![source],
        })
    }
}

// =============================================================================
// Normalized layout: {normalized_dir}/{asset}.csv + shared rate file
// =============================================================================

pub struct NormalizedSource {
    pub dir: PathBuf,
    pub rate_file: String,
}

/// Most recent rate at or before each price date. Both inputs sorted by date.
pub fn forward_fill(prices: &[Point], rates: &[Point]) -> Vec<Point> {
    let mut out = Vec::with_capacity(prices.len());
    let mut idx = 0;
    let mut current: Option<f64> = None;
    for price in prices {
        while idx < rates.len() && rates[idx].date <= price.date {
            current = Some(rates[idx].value);
            idx += 1;
        }
        if let Some(value) = current {
            out.push(Point::new(price.date.clone(), value));
        }
    }
    out
}

fn value_points(table: &CsvTable) -> Vec<Point> {
    match (table.column("date"), table.column("value")) {
        (Some(d), Some(v)) => table.points(d, v),
        _ => Vec::new(),
    }
}

#[async_trait]
impl LayerSource for NormalizedSource {
    fn name(&self) -> &'static str {
        "normalized"
    }

    async fn load(&self, asset: &str) -> Option<SeriesBundle> {
        let price_path = self.dir.join(format!("{}.csv", asset));
        let (price_table, price_source) = read_table(asset, &price_path).await?;
        let prices = value_points(&price_table);
        log_dropped(asset, self.name(), price_table.rows.len(), prices.len());
        if prices.is_empty() {
            return None;
        }

        let mut notes = vec![
            "layout: normalized csv".to_string(),
            "L and D are not provided by the normalized layout".to_string(),
        ];
        let mut sources = vec![price_source];
        let rate_path = self.dir.join(&self.rate_file);
        let j = match read_table(asset, &rate_path).await {
            Some((rate_table, rate_source)) => {
                sources.push(rate_source);
                notes.push(format!("J forward-filled from {}", self.rate_file));
                forward_fill(&prices, &value_points(&rate_table))
            }
            None => {
                notes.push(format!("rate series {} unavailable", self.rate_file));
                Vec::new()
            }
        };

        Some(SeriesBundle {
            source: LayerKind::Normalized,
            series: SeriesSet {
                p: prices,
                j,
                ..Default::default()
            },
            notes,
            sources,
        })
    }
}

// =============================================================================
// Chain
// =============================================================================

pub fn default_sources(cfg: &Config) -> Vec<Box<dyn LayerSource>> {
    vec![
        Box::new(CoreCsvSource { dir: cfg.core_dir.clone() }),
        Box::new(NormalizedSource {
            dir: cfg.normalized_dir.clone(),
            rate_file: cfg.rate_file.clone(),
        }),
    ]
}

/// First loader that yields data wins; otherwise an empty bundle.
pub async fn load_series(sources: &[Box<dyn LayerSource>], asset: &str) -> SeriesBundle {
    for source in sources {
        if let Some(bundle) = source.load(asset).await {
            log(
                Level::Info,
                Domain::Loader,
                "layer_loaded",
                obj(&[
                    ("asset", v_str(asset)),
                    ("layout", v_str(source.name())),
                    ("p_points", json!(bundle.series.p.len())),
                ]),
            );
            return bundle;
        }
    }
    log(
        Level::Warn,
        Domain::Loader,
        "layer_empty",
        obj(&[("asset", v_str(asset)), ("msg", v_str("no layout produced data"))]),
    );
    SeriesBundle::empty()
}

pub async fn build_data_layer(cfg: &Config, asset: &str) -> DataLayer {
    let bundle = load_series(&default_sources(cfg), asset).await;
    let profile = build_profile(&bundle.series, &bundle.notes);
    DataLayer {
        asset: asset.to_string(),
        source: bundle.source,
        series: bundle.series,
        profile,
        sources: bundle.sources,
    }
}
