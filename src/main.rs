use anyhow::{Context, Result};
use assyntrax::api::build_router;
use assyntrax::config::Config;
use assyntrax::logging::{log, obj, v_str, Domain, Level};
use serde_json::json;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let bind = cfg.bind.clone();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("bind", v_str(&bind)),
            ("results_dir", v_str(&cfg.results_dir.display().to_string())),
            ("core_dir", v_str(&cfg.core_dir.display().to_string())),
            ("normalized_dir", v_str(&cfg.normalized_dir.display().to_string())),
            ("policy", json!(cfg.policy)),
        ]),
    );

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    axum::serve(listener, build_router(cfg))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log(Level::Info, Domain::System, "shutdown", obj(&[]));
        })
        .await
        .context("serve")?;
    Ok(())
}
