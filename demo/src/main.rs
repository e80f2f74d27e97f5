//! Investments API
//!
//! A small resource server: every request under `/investments` is authorized
//! by `oauth-claims` before the handler runs.

mod claims_provider;
mod config;
mod logging;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use oauth_claims::{AuthError, ClaimsAuthorizer, IssuerMetadataResolver, MemoryClaimsStore};
use tracing::info;

use crate::claims_provider::InvestorClaimsProvider;
use crate::config::ApiConfig;

/// Investments API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (.toml, .yaml or .json)
    #[arg(short, long, env = "INVESTMENTS_CONFIG", default_value = "demo/api.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.logging.init()?;

    let http_client = config.oauth.http_client()?;

    // The API cannot validate tokens without issuer metadata
    let metadata = IssuerMetadataResolver::new(http_client.clone())
        .load(&config.oauth.authority)
        .await
        .inspect_err(|e| AuthError::from(e.clone()).log())?;

    let authorizer = ClaimsAuthorizer::from_config(
        &config.oauth,
        &metadata,
        Arc::new(InvestorClaimsProvider::default()),
        Arc::new(MemoryClaimsStore::new(config.oauth.claims_cache_capacity)),
        http_client,
    )?;

    let address = config.api.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(%address, issuer = %metadata.issuer, "Investments API listening");

    axum::serve(listener, routes::router(authorizer))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Investments API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
