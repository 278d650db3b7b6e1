//! ein API server binary.
//!
//! Usage:
//!   ein-api --config config/ein.example.toml
//!   ein-api --bind 0.0.0.0:8080 --probe-fixtures fixtures.json
//!
//! Without `--probe-fixtures` specialists have no tool access and every
//! consult records an incomplete finding.

use anyhow::Context;
use clap::Parser;
use ein_agents::{Probe, SpecialistRegistry, StaticProbe, UnavailableProbe};
use ein_api::{serve, AppState};
use ein_coordinator::EinConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "ein-api", version, about = "Alert investigation API server")]
struct Args {
    /// Path to an ein TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overriding `[api] bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON observation fixtures served to specialists
    #[arg(long)]
    probe_fixtures: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,ein_api=debug,ein_session=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            EinConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            EinConfig::default()
        }
    };

    let probe: Arc<dyn Probe> = match args.probe_fixtures {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "Loading probe fixtures");
            Arc::new(
                StaticProbe::from_file(path)
                    .with_context(|| format!("loading probe fixtures {}", path.display()))?,
            )
        }
        None => {
            tracing::warn!("No probe configured; specialists will report incomplete findings");
            Arc::new(UnavailableProbe)
        }
    };

    let state = AppState::from_config(&config, SpecialistRegistry::standard(probe))?;

    let bind = args.bind.unwrap_or_else(|| config.api.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
