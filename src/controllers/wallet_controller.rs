use axum::{
    Json,
    extract::{Extension, State},
};
use serde::Deserialize;

use crate::{
    AppState,
    models::{CardSelector, CurrentUser, Money, Transaction},
    services::{
        auth_service::FieldErrors,
        ledger_service::{Receipt, WithdrawReceipt},
        transaction_service,
    },
};

use super::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct AmountForm {
    pub amount: Money,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawForm {
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    pub amount: Money,
}

impl WithdrawForm {
    /// Card id wins when given; otherwise both label fields are required.
    fn selector(&self) -> Result<CardSelector, FieldErrors> {
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(id) = non_empty(&self.card_id) {
            return Ok(CardSelector::Id(id));
        }

        let mut errs = FieldErrors::new();
        let name = non_empty(&self.card_name);
        let number = non_empty(&self.card_number);
        if name.is_none() {
            errs.insert("cardName".into(), "Enter the card name.".into());
        }
        if number.is_none() {
            errs.insert("cardNumber".into(), "Enter the card number.".into());
        }

        match (name, number) {
            (Some(name), Some(number)) => Ok(CardSelector::Label { name, number }),
            _ => Err(errs),
        }
    }
}

// POST /wallet/add
pub async fn post_add(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<AmountForm>,
) -> ApiResult<Json<Receipt>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let receipt = state.ledger.add_balance(&u.id, form.amount).await?;
    Ok(Json(receipt))
}

// POST /wallet/send
pub async fn post_send(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<AmountForm>,
) -> ApiResult<Json<Receipt>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let receipt = state.ledger.send_balance(&u.id, form.amount).await?;
    Ok(Json(receipt))
}

// POST /wallet/withdraw
pub async fn post_withdraw(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<WithdrawForm>,
) -> ApiResult<Json<WithdrawReceipt>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let selector = form.selector().map_err(ApiError::invalid)?;
    let receipt = state.ledger.withdraw_to_card(&u.id, &selector, form.amount).await?;
    Ok(Json(receipt))
}

// GET /transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let txs = transaction_service::list_transactions(state.store.as_ref(), &u.id).await?;
    Ok(Json(txs))
}
