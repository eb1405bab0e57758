mod routes;
mod state;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use chrono::Utc;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{info, warn};

use badge_common::CredentialScheme;

use crate::{
    routes::{router, AppState},
    state::BadgeRegistry,
};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_IDENTIFIER: &str = "badge-1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let identifier = std::env::var("BADGE_SERVER_IDENTIFIER")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string());
    let scheme = match std::env::var("BADGE_SERVER_SCHEME").ok().as_deref() {
        None | Some("identifier") => CredentialScheme::Identifier,
        Some("ip_address") => CredentialScheme::IpAddress,
        Some(other) => {
            warn!("ignoring unknown BADGE_SERVER_SCHEME `{other}`");
            CredentialScheme::Identifier
        }
    };

    let mut registry = BadgeRegistry::new(identifier.clone(), scheme);
    if std::env::var_os("BADGE_SERVER_DEFER_PROVISION").is_none() {
        registry.provision(Utc::now());
        info!("provisioned `{identifier}` at startup");
    } else {
        info!("provisioning deferred; POST /api/provision to issue credentials");
    }

    let app = router(AppState {
        registry: Arc::new(Mutex::new(registry)),
    });

    let port = std::env::var("BADGE_SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind badge server at {addr}"))?;

    info!("badge server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
