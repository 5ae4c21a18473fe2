/**
 * API REST - Ingestion des rapports + consultation de l'état du parc
 *
 * ROUTES :
 * - GET  /health                     sonde de vie, sans auth
 * - POST /api/v1/report              ingestion (agents)
 * - GET  /api/v1/machines            dernier état par machine, filtres os/hasIssues/q
 * - GET  /api/v1/export.csv          même chose en CSV
 * - GET  /api/v1/machines/{id}       historique (500 max)
 * - GET  /api/v1/system/health       état du serveur
 * - GET  /admin/api/...              même triade pour le tableau admin (200 max en historique)
 *
 * SÉCURITÉ :
 * - tout le préfixe /api (routes inconnues comprises) exige le header X-API-Key,
 *   égalité exacte avec la clé configurée
 * - /admin/api n'a PAS d'auth applicative : choix assumé, l'accès est filtré
 *   au niveau réseau (reverse proxy, VPN)
 */

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{AppError, ValidationError};
use crate::export::{to_csv, CSV_CONTENT_TYPE};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{HistoryEntry, MachineSummary, ReportInput};
use crate::query::{
    history, latest_per_machine, sort_summaries, FleetStats, MachineFilters, SortDir, SortKey,
};
use crate::store::ReportStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ReportStore>,
    pub cfg: Arc<ServerConfig>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(cfg: ServerConfig, store: ReportStore) -> Self {
        Self {
            store: Arc::new(store),
            cfg: Arc::new(cfg),
            health_tracker: HealthTracker::new(),
        }
    }
}

/// Les deux surfaces de lecture ne diffèrent que par ces réglages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Api,
    Admin,
}

impl Surface {
    fn history_limit(self, cfg: &ServerConfig) -> usize {
        match self {
            Surface::Api => cfg.history.api,
            Surface::Admin => cfg.history.admin,
        }
    }

    /// Le tableau admin s'ouvre trié par date, plus récent en haut
    fn default_sort(self) -> Option<(SortKey, SortDir)> {
        match self {
            Surface::Api => None,
            Surface::Admin => Some((SortKey::Timestamp, SortDir::Desc)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    os: Option<String>,
    #[serde(rename = "hasIssues")]
    has_issues: Option<String>,
    q: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MachineList {
    count: usize,
    with_issues: usize,
    items: Vec<MachineSummary>,
}

#[derive(Debug, Serialize)]
struct MachineHistory {
    machine_id: String,
    count: usize,
    items: Vec<HistoryEntry>,
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = req.uri().path();
    // seul le préfixe /api est protégé (pas /health ni /admin/api)
    if path != "/api" && !path.starts_with("/api/") {
        return Ok(next.run(req).await);
    }

    let expected = app.cfg.api_key.as_str();
    if expected.is_empty() {
        warn!("SECURITY: api_key not configured - API access denied");
        return Err(AppError::Unauthorized);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if !ok {
        warn!("[http] rejected credentials on {}", req.uri().path());
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.cfg.body_limit_bytes;

    let api = Router::new()
        .route("/v1/report", post(ingest_report))
        .route("/v1/machines", get(api_list_machines))
        .route("/v1/machines/{id}", get(api_machine_history))
        .route("/v1/export.csv", get(api_export_csv))
        .route("/v1/system/health", get(get_system_health));

    let admin = Router::new()
        .route("/machines", get(admin_list_machines))
        .route("/machines/{id}", get(admin_machine_history))
        .route("/export.csv", get(admin_export_csv));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "ok": true })) }))
        .nest("/api", api)
        .nest("/admin/api", admin)
        .with_state(app_state.clone())
        .layer(middleware::from_fn_with_state(app_state, require_api_key))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// POST /api/v1/report
async fn ingest_report(
    State(app): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(AppError::PayloadTooLarge)
        }
        Err(rejection) => {
            return Err(ValidationError::InvalidField { field: "body", reason: rejection.body_text() }.into())
        }
    };

    let input = ReportInput::from_json(body)?;
    match app.store.append(input) {
        Ok(report) => {
            info!(
                "[ingest] {} @ {} ({} checks, {} reports stored)",
                report.machine_id,
                report.timestamp,
                report.checks.len(),
                app.store.len()
            );
            Ok(Json(json!({ "ok": true })))
        }
        Err(e) => {
            warn!("[ingest] rejected: {e}");
            Err(e.into())
        }
    }
}

/// Réduction + filtres + tri éventuel, commun au listing et au CSV
fn summaries(app: &AppState, params: &ListParams, surface: Surface) -> Result<Vec<MachineSummary>, AppError> {
    let filters = MachineFilters::from_params(
        params.os.as_deref(),
        params.has_issues.as_deref(),
        params.q.as_deref(),
    );

    let sort = match params.sort.as_deref() {
        Some(key) if !key.is_empty() => {
            let key = SortKey::parse(key)
                .ok_or_else(|| AppError::BadRequest(format!("unknown sort key: {key}")))?;
            let dir = params.dir.as_deref().map(SortDir::parse).unwrap_or_default();
            Some((key, dir))
        }
        _ => surface.default_sort(),
    };

    let mut items = app.store.with_reports(|reports| latest_per_machine(reports, &filters));
    if let Some((key, dir)) = sort {
        sort_summaries(&mut items, key, dir);
    }
    Ok(items)
}

fn list_machines(app: &AppState, params: &ListParams, surface: Surface) -> Result<Json<MachineList>, AppError> {
    let items = summaries(app, params, surface)?;
    let stats = FleetStats::of(&items);
    Ok(Json(MachineList { count: stats.machines, with_issues: stats.with_issues, items }))
}

fn export_csv(app: &AppState, params: &ListParams, surface: Surface) -> Result<Response, AppError> {
    let items = summaries(app, params, surface)?;
    Ok(([(header::CONTENT_TYPE, CSV_CONTENT_TYPE)], to_csv(&items)).into_response())
}

fn machine_history(app: &AppState, id: String, params: &HistoryParams, surface: Surface) -> Json<MachineHistory> {
    let max = surface.history_limit(&app.cfg);
    let limit = params.limit.map_or(max, |l| l.min(max));
    let items = app.store.with_reports(|reports| history(reports, &id, limit));
    Json(MachineHistory { machine_id: id, count: items.len(), items })
}

// GET /api/v1/machines
async fn api_list_machines(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<MachineList>, AppError> {
    list_machines(&app, &params, Surface::Api)
}

// GET /api/v1/export.csv
async fn api_export_csv(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    export_csv(&app, &params, Surface::Api)
}

// GET /api/v1/machines/{id}
async fn api_machine_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<MachineHistory> {
    machine_history(&app, id, &params, Surface::Api)
}

// GET /api/v1/system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.store))
}

// GET /admin/api/machines
async fn admin_list_machines(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<MachineList>, AppError> {
    list_machines(&app, &params, Surface::Admin)
}

// GET /admin/api/export.csv
async fn admin_export_csv(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    export_csv(&app, &params, Surface::Admin)
}

// GET /admin/api/machines/{id}
async fn admin_machine_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<MachineHistory> {
    machine_history(&app, id, &params, Surface::Admin)
}
