mod api;
mod auth;
mod config;
mod db;
mod errors;
mod openapi;
mod queue;
mod services;
mod types;

#[cfg(test)]
mod test_utils;

use crate::{
    auth::session::{RedisSessionStore, SessionStore},
    openapi::ApiDoc,
    queue::{RedisStreamQueue, WorkQueue},
    services::reconciliation::ReconciliationSweeper,
};
use axum::{
    http::{Request, Response},
    routing::{get, patch, post},
    Router,
};
use bon::Builder;
use clap::Parser;
use config::{Args, Config};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, Span};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub queue: Arc<dyn WorkQueue>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Public API under `/api/v1`, worker endpoints under `/internal`, plus health and docs.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/jobs",
            post(api::handlers::jobs::create_job).get(api::handlers::jobs::list_jobs),
        )
        .route("/jobs/{job_id}", get(api::handlers::jobs::get_job))
        .route("/billing/credit", post(api::handlers::billing::create_credit))
        .route("/billing/balance", get(api::handlers::billing::get_balance))
        .route("/transactions", get(api::handlers::transactions::list_transactions));

    let internal_routes = Router::new().route("/jobs/{job_id}", patch(api::handlers::internal::update_job));

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .nest("/internal", internal_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &Request<_>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    })
                    .on_response(|response: &Response<_>, latency: Duration, _span: &Span| {
                        tracing::info!(
                            status = %response.status(),
                            latency = ?latency,
                            "request completed"
                        );
                    }),
            ),
        )
        .with_state(state)
}

/// Connect to Postgres with a server-side statement timeout on every connection
async fn connect_database(config: &config::DatabaseConfig) -> anyhow::Result<PgPool> {
    let statement_timeout_ms = config.operation_timeout.as_millis();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await?;

    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    debug!("{:?}", args);

    let config = Config::load(&args)?;
    if args.validate {
        info!("Configuration at {} is valid", args.config.display());
        return Ok(());
    }
    debug!("Starting mediagate with configuration: {:#?}", config);

    let pool = connect_database(&config.database).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let queue: Arc<dyn WorkQueue> = Arc::new(RedisStreamQueue::new(&config.redis_url, &config.queue)?);
    let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(&config.redis_url, &config.sessions)?);

    let shutdown = CancellationToken::new();
    let sweeper = ReconciliationSweeper::new(pool.clone(), queue.clone(), config.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let state = AppState::builder()
        .db(pool.clone())
        .config(config.clone())
        .queue(queue)
        .sessions(sessions)
        .build();
    let router = build_router(state);

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "mediagate listening on http://{}, available at http://localhost:{}",
        bind_addr, config.port
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::error!("Reconciliation sweep task panicked: {}", e);
    }
    pool.close().await;

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[cfg(test)]
mod test {
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::Value;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthz_needs_no_credentials(pool: PgPool) {
        let app = create_test_app(pool).await;

        let response = app.server.get("/healthz").await;

        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_openapi_document_lists_routes(pool: PgPool) {
        let app = create_test_app(pool).await;

        let response = app.server.get("/api-docs/openapi.json").await;

        response.assert_status_ok();
        let doc: Value = response.json();
        let paths = doc["paths"].as_object().expect("paths object");
        for path in [
            "/api/v1/jobs",
            "/api/v1/jobs/{job_id}",
            "/api/v1/billing/credit",
            "/api/v1/billing/balance",
            "/api/v1/transactions",
            "/internal/jobs/{job_id}",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        let schemes = doc["components"]["securitySchemes"].as_object().expect("security schemes");
        assert!(schemes.contains_key("session"));
        assert!(schemes.contains_key("service_api_key"));
        assert!(schemes.contains_key("internal_api_key"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_route_is_not_found(pool: PgPool) {
        let app = create_test_app(pool).await;

        app.server.get("/api/v1/nothing-here").await.assert_status(StatusCode::NOT_FOUND);
    }
}
