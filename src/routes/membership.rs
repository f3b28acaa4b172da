use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::instrument;
use validator::Validate;

use super::client_info;
use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::UserIdentity,
    models::{
        common::SuccessResponse,
        membership::MembershipInfo,
        order::{
            CheckoutResponse, CreateOrderRequest, OrderListQuery, OrderListResponse, OrderSummary,
        },
    },
};

/// GET /api/membership/info
#[instrument(skip(state, identity))]
pub async fn get_membership_info(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<SuccessResponse<MembershipInfo>>> {
    let info = state
        .membership_service
        .get_info(identity.user_id)
        .await?;

    Ok(Json(SuccessResponse::new(info)))
}

/// POST /api/membership/order
#[instrument(skip(state, headers, request), fields(user_id = %identity.user_id))]
pub async fn create_order(
    State(state): State<AppState>,
    identity: UserIdentity,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<SuccessResponse<CheckoutResponse>>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let checkout = state
        .settlement_service
        .checkout(identity.user_id, request, client_info(&headers))
        .await?;

    Ok(Json(SuccessResponse::new(checkout)))
}

/// GET /api/membership/order/{order_no}
#[instrument(skip(state, identity))]
pub async fn get_order_status(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(order_no): Path<String>,
) -> Result<Json<SuccessResponse<OrderSummary>>> {
    let order = state
        .order_service
        .get_order_status(identity.user_id, &order_no)
        .await?;

    Ok(Json(SuccessResponse::new(order)))
}

/// GET /api/membership/orders
#[instrument(skip(state, identity))]
pub async fn list_orders(
    State(state): State<AppState>,
    identity: UserIdentity,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<SuccessResponse<OrderListResponse>>> {
    let orders = state
        .order_service
        .list_orders(identity.user_id, query)
        .await?;

    Ok(Json(SuccessResponse::new(orders)))
}
