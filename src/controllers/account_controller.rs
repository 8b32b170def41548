use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
};

use crate::{
    AppState,
    models::{AccountProfile, AccountSummary, CurrentUser},
    services::account_service::{self, ProfileUpdate},
};

use super::{ApiError, ApiResult};

// GET /account
pub async fn get_account(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<AccountProfile>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let profile = account_service::get_profile(state.store.as_ref(), &u.id).await?;
    Ok(Json(profile))
}

// GET /account/summary
pub async fn get_summary(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<AccountSummary>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let summary = account_service::summary(state.store.as_ref(), &u.id).await?;
    Ok(Json(summary))
}

// PATCH /account
pub async fn patch_account(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<AccountProfile>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let profile =
        account_service::update_profile(state.store.as_ref(), state.auth.as_ref(), &u.id, &update).await?;
    Ok(Json(profile))
}

// DELETE /account
pub async fn delete_account(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<StatusCode> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    account_service::delete_account(state.store.as_ref(), state.auth.as_ref(), &u.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
