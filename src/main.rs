//! Libris Server - Library Borrowing and Fines
//!
//! REST API server for book borrowing, fines and groups.

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    clock::{Clock, SystemClock},
    config::{AppConfig, LoggingConfig},
    repository::{PgRepository, SharedRepository},
    services::{email::EmailService, notifier::DispatchNotifier, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repository: SharedRepository = Arc::new(PgRepository::new(pool));
    let email = EmailService::from_config(&config.email);
    if email.is_none() {
        tracing::info!("Email delivery disabled, notifications are in-app only");
    }
    let notifier = Arc::new(DispatchNotifier::new(repository.clone(), email, clock.clone()));

    let services = Services::new(
        repository,
        notifier,
        clock,
        config.auth.clone(),
        &config.sweeper,
    );

    if config.sweeper.enabled {
        services.sweeper.spawn_scheduler(&config.sweeper);
        tracing::info!(
            "Overdue sweeper scheduled (overdue {}, fines {}, reminders {} UTC)",
            config.sweeper.overdue_at,
            config.sweeper.fine_refresh_at,
            config.sweeper.reminder_at
        );
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Console output in `pretty` or `json` format, plus an optional daily log file
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", logging.level).into());

    let json = logging.format.eq_ignore_ascii_case("json");
    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "libris.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().pretty()))
        .with(file_layer)
        .init();

    guard
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/me", get(api::auth::me))
        // Books
        .route("/books", get(api::books::list_books))
        .route("/books", post(api::books::create_book))
        .route("/books/:id", get(api::books::get_book))
        .route("/books/:id", put(api::books::update_book))
        .route("/books/:id", delete(api::books::delete_book))
        // Borrowings
        .route("/borrowings", post(api::borrowings::create_borrowing))
        .route("/borrowings", get(api::borrowings::list_borrowings))
        .route("/borrowings/:id", get(api::borrowings::get_borrowing))
        .route("/borrowings/:id/return", post(api::borrowings::return_book))
        .route("/borrowings/:id/extend", put(api::borrowings::extend_deadline))
        .route("/borrowings/:id/lost", post(api::borrowings::mark_as_lost))
        // Fines
        .route("/fines", get(api::fines::list_fines))
        .route("/fines/:id", get(api::fines::get_fine))
        .route("/fines/:id", put(api::fines::update_fine))
        .route("/fines/:id/pay", post(api::fines::pay_fine))
        .route("/fines/:id/waive", post(api::fines::waive_fine))
        // Groups
        .route("/groups", post(api::groups::create_group))
        .route("/groups", get(api::groups::list_groups))
        .route("/groups/:id", get(api::groups::get_group))
        .route("/groups/:id", put(api::groups::update_group))
        .route("/groups/:id", delete(api::groups::dissolve_group))
        .route("/groups/:id/approve", post(api::groups::approve_group))
        .route("/groups/:id/reject", post(api::groups::reject_group))
        // Notifications
        .route("/notifications", get(api::notifications::list_notifications))
        .route("/notifications/read-all", put(api::notifications::mark_all_as_read))
        .route("/notifications/:id/read", put(api::notifications::mark_as_read))
        // Feedback
        .route("/feedback", post(api::feedback::create_feedback))
        .route("/feedback", get(api::feedback::list_feedback))
        .route("/feedback/:id", get(api::feedback::get_feedback))
        .route("/feedback/:id", delete(api::feedback::delete_feedback))
        // Settings
        .route("/settings", get(api::settings::get_settings))
        // Admin
        .route("/admin/sweeps", post(api::admin::run_sweep))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
}
