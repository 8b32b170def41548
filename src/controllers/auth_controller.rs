use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    models::CurrentUser,
    services::{
        account_service::{self, SignupForm},
        auth_service::{self, FieldErrors},
    },
};

use super::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

// POST /auth/signup
pub async fn post_signup(
    State(state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> ApiResult<Response> {
    let profile = account_service::register(state.store.as_ref(), state.auth.as_ref(), &form).await?;
    let account = crate::models::AccountId::new(profile.id.clone());
    let token = auth_service::issue_token(&state.settings, &account)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "accountId": account, "token": token, "profile": profile })),
    )
        .into_response())
}

// POST /auth/login
pub async fn post_login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> ApiResult<Response> {
    let email = form.email.trim();

    let mut errors = FieldErrors::new();
    if email.is_empty() {
        errors.insert("email".into(), "Email is required.".into());
    }
    if form.password.is_empty() {
        errors.insert("password".into(), "Password is required.".into());
    }
    if !errors.is_empty() {
        return Err(ApiError::invalid(errors));
    }

    let account = state.auth.sign_in(email, &form.password).await?;
    let token = auth_service::issue_token(&state.settings, &account)?;

    Ok((StatusCode::OK, Json(json!({ "accountId": account, "token": token }))).into_response())
}

// GET /me
pub async fn me(user: Option<Extension<CurrentUser>>) -> ApiResult<Json<CurrentUser>> {
    match user {
        Some(Extension(u)) => Ok(Json(u)),
        None => Err(ApiError::unauthorized()),
    }
}
