// Route modules
pub mod generation;
pub mod membership;
pub mod payment;

use crate::{
    app_state::AppState,
    middleware::{jwt_auth_middleware, logging_middleware},
    models::order::ClientInfo,
};
use axum::{
    http::{header, HeaderMap},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    // User-facing routes, bearer token required
    let authenticated_routes = Router::new()
        .route("/membership/info", get(membership::get_membership_info))
        .route("/membership/order", post(membership::create_order))
        .route("/membership/order/{order_no}", get(membership::get_order_status))
        .route("/membership/orders", get(membership::list_orders))
        .route("/payment/order/{order_no}/query", get(payment::query_order))
        .route("/generation/quota", get(generation::get_quota))
        .route("/generation/consume", post(generation::consume))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Provider callbacks, authenticated by their signatures
    let webhook_routes = Router::new()
        .route("/payment/wechat/notify", post(payment::wechat_notify))
        .route("/payment/alipay/notify", post(payment::alipay_notify));

    Router::new()
        .merge(authenticated_routes)
        .merge(webhook_routes)
        .layer(middleware::from_fn(logging_middleware))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// Client metadata recorded on new orders. Behind a proxy the first
/// `X-Forwarded-For` hop is the client.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let ip = header_str("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .unwrap_or("127.0.0.1")
        .to_string();

    ClientInfo {
        ip,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        device: None,
    }
}
