//! # markflow HTTP API Module
//!
//! This module implements the HTTP REST API server using axum - the
//! surface through which collaborators (auth gateway, admin tooling,
//! report renderers) drive the CORE.
//!
//! ## Endpoints
//!
//! - `POST /records` - Enter marks (create or overwrite a Draft)
//! - `POST /records/value` - Update an editable record's marks
//! - `POST /records/query` - Query records by filter
//! - `GET /records/{id}` - Fetch one record
//! - `GET /audit/{id}` - Fetch a record's audit trail
//! - `POST /workflow/submit|approve|reject|redraft|freeze|publish` - Transitions
//! - `POST /workflow/reopen` - Administrative reopen (admin only)
//! - `POST /workflow/bulk-submit` - Per-item bulk submission
//! - `POST /smart/total|sgpa|cgpa` - Derived totals and GPAs
//! - `POST /attainment/co|po` - Outcome attainment reports
//! - `POST /attainment/snapshot` - Audit snapshot capture
//! - `GET /status` - Store status
//! - `GET /health` - Health check
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `MARKFLOW_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `MARKFLOW_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `MARKFLOW_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
// Re-export handlers and types for integration tests (via `markflow::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    approve_handler, audit_handler, bulk_submit_handler, cgpa_handler, co_attainment_handler,
    create_record_handler, freeze_handler, get_record_handler, health_handler,
    po_attainment_handler, publish_handler, query_handler, redraft_handler, reject_handler,
    reopen_handler, sgpa_handler, smart_total_handler, snapshot_handler, status_handler,
    submit_handler, update_value_handler,
};
#[allow(unused_imports)]
pub use types::{
    ActorJson, AuditEntryJson, AuditResponse, BulkItemJson, BulkSubmitRequest, BulkSubmitResponse,
    CgpaRequest, CoAttainmentRequest, CoAttainmentResponse, CoReportJson, CreateRecordRequest,
    GpaResponse, HealthResponse, OutcomeJson, PoAttainmentRequest, PoAttainmentResponse,
    PoReportJson, QueryRequest, QueryResponse, RecordJson, RecordResponse, ScoreJson, SgpaRequest,
    SmartTotalRequest, SmartTotalResponse, SnapshotRequest, SnapshotResponse, StatusResponse,
    StudentAttainmentJson, TransitionRequest, TransitionResponse, UpdateValueRequest,
};

use crate::config::AcademicConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use markflow_core::{MarkflowError, Session};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the mark session plus the academic configuration.
#[derive(Clone)]
pub struct AppState {
    /// The session containing the record store.
    pub session: Arc<RwLock<Session>>,
    /// Academic configuration (schemes, grade scale, CO/PO entities).
    pub academic: Arc<AcademicConfig>,
}

impl AppState {
    /// Create new app state with a session and configuration.
    #[must_use]
    pub fn new(session: Session, academic: AcademicConfig) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            academic: Arc::new(academic),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `MARKFLOW_CORS_ORIGINS` environment variable:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("MARKFLOW_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (MARKFLOW_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in MARKFLOW_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No MARKFLOW_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. API key gate - validates the transport key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    // Check if rate limiting is enabled
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    // Check if the API key gate is enabled
    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key gate enabled");
    } else {
        tracing::warn!(
            "⚠️  API key gate DISABLED - all endpoints are publicly accessible! \
             Set MARKFLOW_API_KEY environment variable to enable it."
        );
    }

    // Build base router with routes
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/records", post(handlers::create_record_handler))
        .route("/records/value", post(handlers::update_value_handler))
        .route("/records/query", post(handlers::query_handler))
        .route("/records/{id}", get(handlers::get_record_handler))
        .route("/audit/{id}", get(handlers::audit_handler))
        .route("/workflow/submit", post(handlers::submit_handler))
        .route("/workflow/approve", post(handlers::approve_handler))
        .route("/workflow/reject", post(handlers::reject_handler))
        .route("/workflow/redraft", post(handlers::redraft_handler))
        .route("/workflow/freeze", post(handlers::freeze_handler))
        .route("/workflow/publish", post(handlers::publish_handler))
        .route("/workflow/reopen", post(handlers::reopen_handler))
        .route("/workflow/bulk-submit", post(handlers::bulk_submit_handler))
        .route("/smart/total", post(handlers::smart_total_handler))
        .route("/smart/sgpa", post(handlers::sgpa_handler))
        .route("/smart/cgpa", post(handlers::cgpa_handler))
        .route("/attainment/co", post(handlers::co_attainment_handler))
        .route("/attainment/po", post(handlers::po_attainment_handler))
        .route("/attainment/snapshot", post(handlers::snapshot_handler));

    // Apply the API key gate (innermost - runs last on request)
    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    // Apply rate limiting middleware
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Apply CORS, body limit, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(
    addr: &str,
    session: Session,
    academic: AcademicConfig,
) -> Result<(), MarkflowError> {
    let state = AppState::new(session, academic);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MarkflowError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("markflow HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| MarkflowError::IoError(format!("Server error: {}", e)))
}
