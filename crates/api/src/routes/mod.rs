//! API routes

pub mod auth;
pub mod billing;
pub mod gate;
pub mod health;
pub mod licenses;
pub mod subscription;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    let mut public_api_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    // Stripe webhook (public, uses signature verification)
    if state.config.enable_billing {
        public_api_routes = public_api_routes.route("/billing/webhook", post(billing::webhook));
    }

    // Protected API routes (auth required) - under /api/v1
    let mut protected_api_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // License routes
        .route("/licenses", get(licenses::list_licenses))
        .route("/licenses", post(licenses::issue_license))
        .route("/licenses/:theme_id/check", get(licenses::check_license))
        .route("/licenses/:theme_id/consume", post(licenses::consume_license))
        // Subscription and gating
        .route("/subscription", get(subscription::get_subscription))
        .route("/gate", get(gate::check_gate));

    // Billing routes, gated at runtime on config
    if state.config.enable_billing {
        protected_api_routes = protected_api_routes
            .route("/billing/checkout", post(billing::create_checkout))
            .route("/billing/checkout/theme", post(billing::create_theme_checkout))
            .route("/billing/portal", post(billing::create_portal_session))
            .route("/billing/events", get(billing::get_events))
            .route("/billing/events", post(billing::post_event));
    }

    // Apply auth middleware to protected routes
    let protected_api_routes = protected_api_routes
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        // Global request body size limit to prevent oversized payloads
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB limit
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
