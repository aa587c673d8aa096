// Define data modules
mod auth;       // Bearer-token verification and the AuthUser extractor
mod config;     // Environment-driven settings
mod error;      // AppError taxonomy and HTTP mapping
mod events;     // TimerStarted -> task status handler
mod logic;      // Pure time-entry / task-status rules
mod metrics;    // Injected observability collaborator
mod models;     // Data structures (Project, Task, TimeEntry, etc.)
mod ownership;  // Resource ownership guard
mod store;      // SQLite persistence
mod timer;      // Timer lifecycle engine
mod routes_projects; // HTTP handlers for users, projects and goals
mod routes_tasks;    // HTTP handlers for tasks
mod routes_time;     // HTTP handlers for time entries

use std::sync::Arc;

// Import axum routing utilities and Router
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use prometheus::Registry;
use sqlx::SqlitePool;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::auth::{StaticTokens, TokenVerifier};
use crate::config::Config;
use crate::metrics::{Metrics, PrometheusMetrics};
use crate::timer::TimerEngine;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub timer: TimerEngine,
    pub tokens: Arc<dyn TokenVerifier>,
    pub registry: Registry,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        tokens: Arc<dyn TokenVerifier>,
        metrics: Arc<dyn Metrics>,
        registry: Registry,
    ) -> Self {
        let timer = TimerEngine::new(pool.clone(), metrics);
        Self { pool, timer, tokens, registry }
    }
}

// -----------------------------
// GET /api/metrics
// Prometheus text exposition
// -----------------------------
async fn export_metrics(State(state): State<AppState>) -> Result<String, (StatusCode, String)> {
    metrics::encode_text(&state.registry).map_err(|e| {
        tracing::error!(error = %e, "metrics export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // users
        .route("/users", post(routes_projects::create_user))
        // projects
        .route(
            "/projects",
            get(routes_projects::list_projects).post(routes_projects::create_project),
        )
        .route("/projects/:id", delete(routes_projects::delete_project))
        .route("/projects/:id/tasks", post(routes_tasks::create_task))
        // tasks
        .route(
            "/tasks/:id",
            get(routes_tasks::get_task)
                .put(routes_tasks::update_task)
                .delete(routes_tasks::delete_task),
        )
        // goals
        .route("/goals", post(routes_projects::create_goal))
        .route("/goals/:id", delete(routes_projects::delete_goal))
        // time tracking
        .route("/time-entries", get(routes_time::list_entries))
        .route("/time-entries/start", post(routes_time::start_timer))
        .route("/time-entries/stop", post(routes_time::stop_timer))
        .route("/time-entries/active", get(routes_time::get_active))
        .route(
            "/time-entries/:id",
            put(routes_time::update_entry).delete(routes_time::delete_entry),
        )
        // observability
        .route("/metrics", get(export_metrics))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskflow=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    if config.tokens.is_empty() {
        tracing::warn!("TASKFLOW_TOKENS is empty; every authenticated request will be rejected");
    }

    let pool = store::connect(&config.database_url, config.max_connections).await?;
    store::migrate(&pool).await?;

    let registry = Registry::new();
    let metrics = Arc::new(PrometheusMetrics::new(&registry)?);
    let state = AppState::new(
        pool,
        Arc::new(StaticTokens::new(config.tokens.clone())),
        metrics,
        registry,
    );

    let app = Router::new()
        .nest("/api", api_router(state))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http());

    tracing::info!(addr = %config.addr, database = %config.database_url, "server running");
    tracing::info!("static files: http://{}/", config.addr);
    tracing::info!("API base:     http://{}/api", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
