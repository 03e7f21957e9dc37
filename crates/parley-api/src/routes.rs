//! Router setup with all API routes and middleware, plus the server entry
//! point (plain HTTP or rustls).

use std::future::Future;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;

use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;

/// Prefix shared by all protected routes.
pub const API_PREFIX: &str = "/api/v1";

/// Body size cap for every route.
const MAX_BODY_BYTES: usize = 256 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors = cors_layer(&server.cors_origins);
    let limiter = RateLimiter::new(server.rate_limit_per_sec);
    let max_turns = server.max_concurrent_turns.max(1);

    let public_routes = Router::new().route("/health", get(handlers::health));

    let api_routes = Router::new()
        .route(
            "/chat",
            post(handlers::send_message).layer(ConcurrencyLimitLayer::new(max_turns)),
        )
        .route(
            "/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route("/conversations/{id}/messages", get(handlers::list_messages))
        .route("/conversations/{id}", delete(handlers::delete_conversation))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ))
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(limiter));

    public_routes
        .nest(API_PREFIX, api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
///
/// Uses rustls when `tls.enabled` is set; certificate paths are checked by
/// config validation.
pub async fn start_server<F>(
    config: &ParleyConfig,
    state: AppState,
    shutdown: F,
) -> Result<(), ParleyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(state);

    if config.tls.enabled {
        let (cert, key) = match (&config.tls.cert_path, &config.tls.key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(ParleyError::Config(
                    "tls.cert_path and tls.key_path are required when TLS is enabled".to_string(),
                ))
            }
        };
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
            .await
            .map_err(|e| ParleyError::Config(format!("Failed to load TLS certificate: {}", e)))?;

        let socket = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| ParleyError::Api(format!("Failed to resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| ParleyError::Api(format!("No address for {}", addr)))?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        info!(addr = %socket, "Starting API server with TLS");
        axum_server::bind_rustls(socket, tls)
            .handle(handle)
            .serve(router.into_make_service())
            .await
            .map_err(|e| ParleyError::Api(format!("Server error: {}", e)))?;
    } else {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ParleyError::Api(format!("Failed to bind {}: {}", addr, e)))?;

        info!(addr = %addr, "Starting API server");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ParleyError::Api(format!("Server error: {}", e)))?;
    }

    info!("API server stopped");
    Ok(())
}
