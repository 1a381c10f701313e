//! Per-request assembly of the asset detail payload.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::assets::{assets_meta, is_valid_asset_id, list_assets, AssetMeta};
use crate::config::Config;
use crate::data::{build_data_layer, DataLayer};
use crate::gate::{evaluate, OperationalLayer};
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::regime::{self, derive_dynamic_layer, DynamicLayer};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("no assets could be listed from the configured directories")]
    NoAssets,
    #[error("invalid asset id: {0:?}")]
    InvalidAsset(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPayload {
    pub asset: String,
    pub assets: Vec<String>,
    pub assets_meta: BTreeMap<String, AssetMeta>,
    pub data: DataLayer,
    pub dynamic: DynamicLayer,
    pub operational: OperationalLayer,
}

/// Data, dynamic and operational layers for one asset, straight from disk.
pub async fn build_layers(cfg: &Config, asset: &str) -> (DataLayer, DynamicLayer, OperationalLayer) {
    let data = build_data_layer(cfg, asset).await;
    let dates: Vec<String> = data.series.p.iter().map(|p| p.date.clone()).collect();
    let dynamic = derive_dynamic_layer(&regime::default_sources(cfg), asset, &dates).await;
    let operational = evaluate(&data.profile, &dynamic, &cfg.policy);
    (data, dynamic, operational)
}

/// `requested = None` picks the first listed asset. An asset that is not
/// listed is still computed and simply comes back with empty layers.
pub async fn build_asset_payload(cfg: &Config, requested: Option<&str>) -> Result<AssetPayload, PayloadError> {
    if let Some(asset) = requested {
        if !is_valid_asset_id(asset) {
            return Err(PayloadError::InvalidAsset(asset.to_string()));
        }
    }
    let assets = list_assets(cfg).await;
    let asset = match requested {
        Some(asset) => asset.to_string(),
        None => assets.first().cloned().ok_or(PayloadError::NoAssets)?,
    };
    if assets.is_empty() {
        return Err(PayloadError::NoAssets);
    }

    let _scope = ProfileScope::with_context("asset_payload", &[("asset", v_str(&asset))]);
    let meta = assets_meta(cfg, &assets).await;
    let (data, dynamic, operational) = build_layers(cfg, &asset).await;

    log(
        Level::Info,
        Domain::Api,
        "payload_built",
        obj(&[
            ("asset", v_str(&asset)),
            ("n_points", json!(data.profile.n_points)),
            ("rows", json!(dynamic.rows.len())),
            ("status", v_str(operational.status.as_str())),
        ]),
    );

    Ok(AssetPayload {
        asset,
        assets,
        assets_meta: meta,
        data,
        dynamic,
        operational,
    })
}
