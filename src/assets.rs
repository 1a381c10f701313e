//! Asset catalog: which entities exist on disk and where they are.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::config::Config;
use crate::logging::{log, obj, v_str, Domain, Level};

pub const MAX_ASSET_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub city: String,
    pub state: Option<String>,
    pub region: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DictionaryEntry {
    city: Option<String>,
    state: Option<String>,
    region: Option<String>,
    source: Option<String>,
}

const CITY_STATE: &[(&str, &str)] = &[
    ("sao paulo", "SP"),
    ("campinas", "SP"),
    ("santos", "SP"),
    ("ribeirao preto", "SP"),
    ("sao jose dos campos", "SP"),
    ("rio de janeiro", "RJ"),
    ("niteroi", "RJ"),
    ("belo horizonte", "MG"),
    ("vitoria", "ES"),
    ("curitiba", "PR"),
    ("londrina", "PR"),
    ("florianopolis", "SC"),
    ("joinville", "SC"),
    ("balneario camboriu", "SC"),
    ("porto alegre", "RS"),
    ("brasilia", "DF"),
    ("goiania", "GO"),
    ("campo grande", "MS"),
    ("cuiaba", "MT"),
    ("salvador", "BA"),
    ("recife", "PE"),
    ("fortaleza", "CE"),
    ("joao pessoa", "PB"),
    ("natal", "RN"),
    ("maceio", "AL"),
    ("aracaju", "SE"),
    ("teresina", "PI"),
    ("sao luis", "MA"),
    ("manaus", "AM"),
    ("belem", "PA"),
];

fn state_region(state: &str) -> Option<&'static str> {
    match state {
        "SP" | "RJ" | "MG" | "ES" => Some("Sudeste"),
        "PR" | "SC" | "RS" => Some("Sul"),
        "DF" | "GO" | "MT" | "MS" => Some("Centro-Oeste"),
        "BA" | "PE" | "CE" | "PB" | "RN" | "AL" | "SE" | "PI" | "MA" => Some("Nordeste"),
        "AM" | "PA" | "RO" | "RR" | "AP" | "AC" | "TO" => Some("Norte"),
        _ => None,
    }
}

/// Ids are joined into file paths, so only a conservative charset is allowed.
pub fn is_valid_asset_id(asset: &str) -> bool {
    !asset.is_empty()
        && asset.len() <= MAX_ASSET_ID_LEN
        && !asset.starts_with('.')
        && asset
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn words(asset: &str) -> Vec<String> {
    asset
        .split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

fn title_case(words: &[String]) -> String {
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Metadata inferred from the id alone. The longest trailing run of words that
/// names a known city wins, so source prefixes such as `FIPEZAP_` are skipped.
pub fn derive_meta(asset: &str) -> AssetMeta {
    let w = words(asset);
    for start in 0..w.len() {
        let candidate = w[start..].join(" ");
        if let Some((_, state)) = CITY_STATE.iter().find(|(city, _)| *city == candidate) {
            return AssetMeta {
                city: title_case(&w[start..]),
                state: Some(state.to_string()),
                region: state_region(state).map(str::to_string),
                source: "derived".to_string(),
            };
        }
    }
    AssetMeta {
        city: title_case(&w),
        state: None,
        region: None,
        source: "derived".to_string(),
    }
}

async fn load_dictionary(path: &Path) -> Result<BTreeMap<String, DictionaryEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

fn lookup<'a>(dict: &'a BTreeMap<String, DictionaryEntry>, asset: &str) -> Option<&'a DictionaryEntry> {
    dict.get(asset).or_else(|| {
        dict.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(asset))
            .map(|(_, v)| v)
    })
}

fn merge(entry: &DictionaryEntry, derived: AssetMeta) -> AssetMeta {
    let state = entry.state.clone().or(derived.state);
    let region = entry
        .region
        .clone()
        .or_else(|| state.as_deref().and_then(state_region).map(str::to_string))
        .or(derived.region);
    AssetMeta {
        city: entry.city.clone().unwrap_or(derived.city),
        state,
        region,
        source: entry.source.clone().unwrap_or_else(|| "dictionary".to_string()),
    }
}

/// Dictionary first, derived metadata otherwise.
pub async fn assets_meta(cfg: &Config, assets: &[String]) -> BTreeMap<String, AssetMeta> {
    let dict = match load_dictionary(&cfg.asset_dictionary).await {
        Ok(dict) => dict,
        Err(err) => {
            log(
                Level::Debug,
                Domain::Loader,
                "asset_dictionary_unavailable",
                obj(&[("error", v_str(&format!("{:#}", err)))]),
            );
            BTreeMap::new()
        }
    };
    assets
        .iter()
        .map(|asset| {
            let derived = derive_meta(asset);
            let meta = match lookup(&dict, asset) {
                Some(entry) => merge(entry, derived),
                None => derived,
            };
            (asset.clone(), meta)
        })
        .collect()
}

async fn scan_dir(dir: &Path, keep: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(name) = entry.file_name().to_str() {
            if let Some(asset) = keep(name).filter(|a| is_valid_asset_id(a)) {
                out.push(asset);
            }
        }
    }
    out
}

/// Union of every asset that has at least one artifact in any layout.
pub async fn list_assets(cfg: &Config) -> Vec<String> {
    let rate_file = cfg.rate_file.clone();
    let mut set = BTreeSet::new();
    set.extend(scan_dir(&cfg.core_dir, |n| n.strip_suffix("_core.csv").map(str::to_string)).await);
    set.extend(
        scan_dir(&cfg.normalized_dir, |n| {
            if n == rate_file {
                return None;
            }
            n.strip_suffix(".csv").map(str::to_string)
        })
        .await,
    );
    set.extend(
        scan_dir(&cfg.regimes_dir(), |n| {
            n.strip_suffix("_monthly_regimes.csv").map(str::to_string)
        })
        .await,
    );
    set.extend(scan_dir(&cfg.hmm_dir(), |n| n.strip_suffix("_hmm.json").map(str::to_string)).await);

    let assets: Vec<String> = set.into_iter().collect();
    log(
        Level::Debug,
        Domain::Loader,
        "assets_listed",
        obj(&[("count", json!(assets.len()))]),
    );
    assets
}
