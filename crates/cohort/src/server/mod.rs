//! REST backend for the participant registry.
//!
//! Routes live under `/api`. Every handler shares one [`AppState`] holding a
//! [`Registry`]; failures are rendered by the `IntoResponse` impl in
//! [`error`] as `{ "code", "message" }` bodies.

mod error;
mod extract;
mod handlers;

use std::time::Instant;

use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, patch, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::registry::Registry;

pub use error::ErrorBody;
pub use handlers::Health;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Participant store.
    pub registry: Registry,
    /// When the server was started.
    pub started_at: Instant,
}

impl AppState {
    /// State for a server starting now.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            started_at: Instant::now(),
        }
    }
}

/// Build the application router.
#[must_use]
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let participant = "/participants/{id}";
    let formation = "/participants/{id}/formations/{fid}";
    let course = "/participants/{id}/formations/{fid}/courses/{cid}";
    let session = "/participants/{id}/formations/{fid}/courses/{cid}/sessions/{sid}";

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route(
            "/participants",
            get(handlers::list_participants).post(handlers::create_participant),
        )
        .route(
            participant,
            get(handlers::get_participant)
                .put(handlers::put_participant)
                .patch(handlers::patch_participant)
                .delete(handlers::delete_participant),
        )
        .route(
            &format!("{participant}/progress"),
            get(handlers::participant_progress),
        )
        .route(
            &format!("{participant}/formations"),
            post(handlers::add_formation),
        )
        .route(
            formation,
            patch(handlers::update_formation).delete(handlers::delete_formation),
        )
        .route(&format!("{formation}/courses"), post(handlers::add_course))
        .route(course, delete(handlers::delete_course))
        .route(&format!("{course}/sessions"), post(handlers::add_session))
        .route(
            session,
            patch(handlers::update_session).delete(handlers::delete_session),
        )
        .route(&format!("{session}/links"), post(handlers::add_link))
        .route(
            &format!("{session}/links/{{lid}}"),
            delete(handlers::delete_link),
        )
        .route(
            &format!("{participant}/projects"),
            post(handlers::add_project),
        )
        .route(
            &format!("{participant}/projects/{{pid}}"),
            delete(handlers::delete_project),
        )
        .route(
            &format!("{participant}/coaching-resources"),
            post(handlers::add_resource),
        )
        .route(
            &format!("{participant}/coaching-resources/{{rid}}"),
            delete(handlers::delete_resource),
        )
        .route(
            &format!("{participant}/notifications"),
            post(handlers::push_notification),
        )
        .route(
            &format!("{participant}/notifications/read"),
            post(handlers::mark_all_notifications_read),
        )
        .route(
            &format!("{participant}/notifications/{{nid}}/read"),
            post(handlers::mark_notification_read),
        )
        .route(
            "/diagnostic-domains",
            get(handlers::list_domains).post(handlers::create_domain),
        )
        .route("/diagnostic-domains/{id}", delete(handlers::delete_domain));

    Router::new()
        .nest("/api", api)
        .layer(cors_layer(&config.cors_origins))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(config: &ServerConfig, registry: Registry) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let app = router(AppState::new(registry), config);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
