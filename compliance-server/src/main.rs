/**
 * COMPLIANCE SERVER - Point d'entrée du serveur de conformité du parc
 *
 * RÔLE : Reçoit les rapports périodiques des postes (chiffrement disque, mises à jour OS,
 * antivirus, politique de veille), les conserve dans un log append-only et expose
 * le dernier état de chaque machine (JSON, CSV, historique).
 *
 * ARCHITECTURE : config -> store (chargé ou créé) -> état HTTP -> Axum.
 */

mod config;
mod error;
mod export;
mod health;
mod http;
mod models;
mod query;
mod store;

use crate::config::{load_config, DEFAULT_API_KEY};
use crate::http::AppState;
use crate::store::{JsonFilePersistence, MemoryPersistence, ReportStore};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("compliance_server=info,tower_http=info")),
        )
        .init();

    let cfg = load_config().await;
    if cfg.api_key == DEFAULT_API_KEY {
        warn!("[server] using the default development API key, set API_KEY in production");
    }

    let store = if cfg.persist {
        ReportStore::open(JsonFilePersistence::new(&cfg.db_path))
            .with_context(|| format!("failed to open report database {}", cfg.db_path))?
    } else {
        warn!("[server] persistence disabled, reports are lost on restart");
        ReportStore::open(MemoryPersistence::new()).context("failed to open in-memory store")?
    };

    let addr = cfg.listen_addr();
    let app = http::build_router(AppState::new(cfg, store));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[server] listening on http://{addr}");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
