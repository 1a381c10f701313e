//! One-shot payload report for a single asset.
//!
//! Usage: asset_report [--root DIR] [ASSET]
//!
//! Without `--root` the directories come from the same environment variables
//! as the server. Without ASSET the first listed asset is reported.

use anyhow::{bail, Result};
use assyntrax::config::Config;
use assyntrax::payload::build_asset_payload;

fn main() -> Result<()> {
    // Keep stdout to the report unless the caller asked for logs. Set before
    // any runtime threads exist.
    if std::env::var("LOG_LEVEL").is_err() {
        std::env::set_var("LOG_LEVEL", "error");
    }
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run())
}

async fn run() -> Result<()> {
    let mut root: Option<String> = None;
    let mut asset: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => match args.next() {
                Some(dir) => root = Some(dir),
                None => bail!("--root needs a directory"),
            },
            "-h" | "--help" => {
                println!("usage: asset_report [--root DIR] [ASSET]");
                return Ok(());
            }
            _ if asset.is_none() => asset = Some(arg),
            _ => bail!("unexpected argument: {}", arg),
        }
    }

    let cfg = match root {
        Some(dir) => {
            let mut cfg = Config::rooted(dir);
            cfg.policy = assyntrax::gate::GatePolicy::from_env();
            cfg
        }
        None => Config::from_env(),
    };

    let payload = build_asset_payload(&cfg, asset.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
