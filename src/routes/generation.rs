use axum::{extract::State, Json};
use tracing::instrument;

use crate::{
    app_state::AppState,
    error::Result,
    middleware::UserIdentity,
    models::{
        common::SuccessResponse,
        quota::{QuotaOverview, QuotaSnapshot},
    },
};

/// GET /api/generation/quota
#[instrument(skip(state, identity))]
pub async fn get_quota(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<SuccessResponse<QuotaOverview>>> {
    let quota = state.quota_service.get_quota(identity.user_id).await?;

    Ok(Json(SuccessResponse::new(quota)))
}

/// POST /api/generation/consume
///
/// Called by the generation pipeline before it starts a job.
#[instrument(skip(state, identity))]
pub async fn consume(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<SuccessResponse<QuotaSnapshot>>> {
    let snapshot = state.quota_service.consume_one(identity.user_id).await?;

    Ok(Json(SuccessResponse::new(snapshot)))
}
