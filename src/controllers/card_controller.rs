use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    models::{Card, CurrentUser},
    services::card_service::{self, CardDraft},
};

use super::{ApiError, ApiResult};

// GET /cards
pub async fn list_cards(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Vec<Card>>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let cards = card_service::list_cards(state.store.as_ref(), &u.id).await?;
    Ok(Json(cards))
}

// POST /cards
pub async fn post_card(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(draft): Json<CardDraft>,
) -> ApiResult<Response> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let card = card_service::add_card(state.store.as_ref(), &u.id, &draft).await?;
    Ok((StatusCode::CREATED, Json(card)).into_response())
}

// GET /cards/:id
pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Card>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let card = card_service::get_card(state.store.as_ref(), &u.id, &card_id).await?;
    Ok(Json(card))
}

// PUT /cards/:id
pub async fn put_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Json(draft): Json<CardDraft>,
) -> ApiResult<Json<Card>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let card = card_service::update_card(state.store.as_ref(), &u.id, &card_id, &draft).await?;
    Ok(Json(card))
}

// DELETE /cards/:id
pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<StatusCode> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    card_service::delete_card(state.store.as_ref(), &u.id, &card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
