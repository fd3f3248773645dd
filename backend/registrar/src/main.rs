//! Summer School Registrar — entry point.
//!
//! Opens the SQLite store, builds the enrollment engine and exposes it as a
//! small Axum REST API. A background auditor periodically re-checks seat,
//! waitlist and ledger consistency.

mod api;
mod auditor;
mod config;
mod errors;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use enrollment_engine::{db, EnrollmentEngine};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, config.max_db_connections).await?;
    let engine = EnrollmentEngine::new(pool, config.engine_config());

    let shutdown = CancellationToken::new();

    // ─── Background auditor ───────────────────────────────
    let auditor = if config.audit_interval_secs > 0 {
        Some(tokio::spawn(auditor::run(
            engine.clone(),
            Duration::from_secs(config.audit_interval_secs),
            shutdown.clone(),
        )))
    } else {
        info!("Auditor disabled (AUDIT_INTERVAL_SECS=0)");
        None
    };

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { engine });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/audit", get(api::audit))
        .route("/students", post(api::create_student))
        .route(
            "/students/:id",
            get(api::get_student).patch(api::update_student),
        )
        .route("/students/:id/balance", get(api::get_balance))
        .route("/students/:id/balance/loads", post(api::load_balance))
        .route("/students/:id/ledger", get(api::get_ledger))
        .route(
            "/students/:id/registrations",
            get(api::get_student_registrations),
        )
        .route("/teachers", post(api::create_teacher))
        .route(
            "/courses",
            get(api::list_courses).post(api::create_course),
        )
        .route("/courses/:id", get(api::get_course))
        .route("/courses/:id/state", post(api::set_course_state))
        .route("/courses/:id/enrollments", post(api::enroll))
        .route("/courses/:id/requests", post(api::request_course))
        .route("/courses/:id/roster", get(api::get_roster))
        .route("/courses/:id/waitlist", get(api::get_waitlist))
        .route("/registrations/:id/grade", put(api::set_grade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = auditor {
        let _ = handle.await;
    }
    info!("Registrar stopped");
    Ok(())
}

/// Resolve on Ctrl-C, cancelling background work with it.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
