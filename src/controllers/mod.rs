use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::{
    account_service::AccountError,
    auth_service::{AuthError, FieldErrors},
    card_service::CardError,
    ledger_service::LedgerError,
};
use crate::store::StoreError;

pub mod home_controller;
pub mod auth_controller;
pub mod account_controller;
pub mod card_controller;
pub mod wallet_controller;
pub mod realtime_controller;

/// JSON error body: `{"error": code, "message": text, "fields": {...}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub fields: Option<FieldErrors>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
            fields: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "Sign in to continue.")
    }

    pub fn invalid(fields: FieldErrors) -> Self {
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "invalid_input",
            message: "Please fix the highlighted fields.".into(),
            fields: Some(fields),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.code, "message": self.message });
        if let Some(fields) = self.fields {
            body["fields"] = json!(fields);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if let StoreError::Conflict(_) = e {
            return ApiError::new(StatusCode::CONFLICT, "conflict", e.to_string());
        }
        tracing::error!(error = %e, "store error");
        ApiError::new(StatusCode::BAD_GATEWAY, "store_error", e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let (status, code) = match &e {
            LedgerError::InvalidAmount => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount"),
            LedgerError::InsufficientFunds { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds"),
            LedgerError::InsufficientCardBalance { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_card_balance")
            }
            LedgerError::CardNotFound => (StatusCode::NOT_FOUND, "card_not_found"),
            LedgerError::StoreReadFailed(_) => (StatusCode::BAD_GATEWAY, "store_read_failed"),
            LedgerError::StoreWriteFailed(_) => (StatusCode::BAD_GATEWAY, "store_write_failed"),
            LedgerError::Unrecorded { .. } => (StatusCode::BAD_GATEWAY, "unrecorded"),
            LedgerError::Stranded { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "stranded"),
            LedgerError::Contended { .. } => (StatusCode::CONFLICT, "contended"),
            LedgerError::NotSignedIn => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };
        ApiError::new(status, code, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Invalid(fields) => ApiError::invalid(fields),
            AuthError::EmailTaken => {
                let mut fields = FieldErrors::new();
                fields.insert("email".into(), "Email has already been taken!".into());
                ApiError::invalid(fields)
            }
            AuthError::InvalidCredentials => {
                ApiError::new(StatusCode::UNAUTHORIZED, "invalid_credentials", "Invalid email or password.")
            }
            AuthError::UnknownUser(_) => ApiError::new(StatusCode::NOT_FOUND, "not_found", e.to_string()),
            AuthError::Store(s) => s.into(),
            other => {
                tracing::error!(error = %other, "auth failure");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "Server error. Please try again.")
            }
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Invalid(fields) => ApiError::invalid(fields),
            AccountError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "not_found", e.to_string()),
            AccountError::NotSignedIn => ApiError::unauthorized(),
            AccountError::Auth(a) => a.into(),
            AccountError::Store(s) => s.into(),
        }
    }
}

impl From<CardError> for ApiError {
    fn from(e: CardError) -> Self {
        match e {
            CardError::Invalid(fields) => ApiError::invalid(fields),
            CardError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "card_not_found", e.to_string()),
            CardError::Store(s) => s.into(),
        }
    }
}
