use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use socra_core::orchestrator::SessionOrchestrator;
use socra_core::store::InMemorySessionStore;

mod config;
mod error;
mod extract;
mod llm_client;
mod middleware;
mod results_provider;
mod routes;
mod session_locks;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Socra Tutoring API",
        version = "0.1.0",
        description = "Conversational math tutoring driven by a learner's diagnostic test results."
    ),
    paths(
        routes::health::health_check,
        routes::sessions::start_session,
        routes::sessions::handle_action,
        routes::sessions::get_session,
        routes::sessions::evict_session,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::sessions::StartSessionRequest,
        routes::sessions::ActionRequest,
        routes::sessions::EvictedSessionResponse,
        socra_core::error::ApiError,
        socra_core::action::Action,
        socra_core::response::QuickReply,
        socra_core::response::ActionResponse,
        socra_core::response::StartSessionResponse,
        socra_core::results::DiagnosticSummary,
        socra_core::evaluator::AnswerAnalysis,
        socra_core::evaluator::FeedbackType,
        socra_core::hint::HintAnalysis,
        socra_core::hint::HintLevel,
        socra_core::intent::RequestKind,
        socra_core::session::LearningSession,
        socra_core::session::SessionSummary,
        socra_core::session::Stage,
        socra_core::session::Role,
        socra_core::session::ConversationTurn,
        socra_core::session::GeneratedItem,
        socra_core::session::ProblemOutcome,
        socra_core::session::DiagnosticProfile,
    ))
)]
struct ApiDoc;

fn fail(context: &str, err: impl Display) -> ! {
    tracing::error!(error = %err, "{context}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "socra_api=debug,socra_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::TutorConfig::from_env()
        .unwrap_or_else(|e| fail("Invalid configuration", e));

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .unwrap_or_else(|e| fail("Failed to connect to database", e));

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .unwrap_or_else(|e| fail("Failed to run migrations", e));

    let gateway = llm_client::ChatCompletionsGateway::new(config.llm.clone())
        .unwrap_or_else(|e| fail("Failed to build language model client", e));

    let tutor = Arc::new(SessionOrchestrator::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(results_provider::PgSessionResultProvider::new(pool.clone())),
        Arc::new(gateway),
    ));
    let locks = Arc::new(session_locks::SessionLocks::new());

    let idle_ttl = chrono::Duration::from_std(config.session_idle_ttl)
        .unwrap_or_else(|e| fail("SESSION_IDLE_TTL_SECS is out of range", e));
    tokio::spawn(sweep_sessions(
        tutor.clone(),
        locks.clone(),
        idle_ttl,
        config.sweep_interval,
    ));

    let app_state = state::AppState {
        db: pool,
        tutor,
        locks,
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::sessions::start_router().layer(middleware::rate_limit::sessions_layer()))
        .merge(routes::sessions::session_router().layer(middleware::rate_limit::actions_layer()))
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(config.require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| fail("Failed to bind listener", e));
    tracing::info!("Socra API listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        fail("Server error", e);
    }
}

/// Evict completed and idle sessions, then forget their locks. Sessions with a
/// request in flight wait for the next sweep.
async fn sweep_sessions(
    tutor: Arc<SessionOrchestrator>,
    locks: Arc<session_locks::SessionLocks>,
    idle_ttl: chrono::Duration,
    every: std::time::Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let evicted = tutor.evict_stale(Utc::now(), idle_ttl, &|key| locks.is_busy(key));
        locks.prune();
        if !evicted.is_empty() {
            tracing::info!(
                evicted = evicted.len(),
                active = tutor.store().len(),
                "Swept stale sessions"
            );
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
