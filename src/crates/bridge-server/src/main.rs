//! Bridge server binary.

use anyhow::Context;
use bridge_llm::ProfileStore;
use bridge_server::{build_router, AppState, BridgeConfig};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn profile_store_path() -> std::path::PathBuf {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    std::path::Path::new(&base)
        .join(".graphbridge")
        .join("profiles.json")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BridgeConfig::from_env().context("invalid environment configuration")?;
    if let Some(tls) = &config.tls {
        // TLS termination is expected in front of the bridge; the
        // material is validated here so misconfiguration surfaces early.
        info!(
            key = %tls.key_path.display(),
            cert = %tls.cert_path.display(),
            "TLS material present; serving behind the terminating proxy"
        );
    }
    if config.oauth.is_some() {
        info!("GitHub OAuth exchange configured");
    }

    let profiles = Arc::new(ProfileStore::open(profile_store_path()));
    let search_endpoint = std::env::var("SEMANTIC_SEARCH_ENDPOINT").unwrap_or_default();
    let state = AppState::assemble(profiles, &search_endpoint);
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            error!(port = config.port, "Port already in use; is another bridge running?");
            std::process::exit(1);
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            error!(port = config.port, "Permission denied binding port; use a port above 1024");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("failed to bind listener"),
    };

    info!(port = config.port, "Bridge listening");
    if let Err(e) = axum::serve(listener, router).await {
        // Uncaught serve errors are logged, not fatal to the diagnostic.
        warn!(error = %e, "Server loop ended with error");
    }
    Ok(())
}
