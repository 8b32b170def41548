use std::sync::Arc;

use futures_util::{StreamExt, stream::BoxStream};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    models::{AccountId, Card, CardNetwork, Money, card},
    store::{self, DocumentStore, StoreError, StorePath, StoreResult},
};

use super::{account_service, auth_service::FieldErrors};

pub fn cards_path(account: &AccountId) -> StoreResult<StorePath> {
    account_service::account_path(account)?.child("cards")
}

pub fn card_path(account: &AccountId, card_id: &str) -> StoreResult<StorePath> {
    cards_path(account)?.child(card_id)
}

#[derive(thiserror::Error, Debug)]
pub enum CardError {
    #[error("invalid card")]
    Invalid(FieldErrors),
    #[error("card {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CardResult<T> = Result<T, CardError>;

/// Card attributes as entered by the user, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDraft {
    pub card_type: String,
    pub card_number: String,
    pub card_name: String,
    #[serde(default)]
    pub balance: Money,
}

impl CardDraft {
    pub fn validate(&self) -> Result<Card, FieldErrors> {
        let mut errs = FieldErrors::new();

        let network = match self.card_type.parse::<CardNetwork>() {
            Ok(n) => Some(n),
            Err(_) => {
                errs.insert("cardType".into(), "Card type must be VISA or MASTERCARD.".into());
                None
            }
        };

        let number = card::normalize_number(&self.card_number);
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            errs.insert("cardNumber".into(), "Enter a valid card number.".into());
        }

        let name = self.card_name.trim();
        if name.is_empty() {
            errs.insert("cardName".into(), "Card name is required.".into());
        }

        if self.balance.is_negative() {
            errs.insert("balance".into(), "Invalid balance".into());
        }

        match network {
            Some(card_type) if errs.is_empty() => Ok(Card {
                id: String::new(),
                card_type,
                card_number: number,
                card_name: name.to_string(),
                balance: self.balance,
            }),
            _ => Err(errs),
        }
    }
}

fn decode_card(path: &StorePath, value: Value) -> StoreResult<Card> {
    let mut card: Card = store::decode(path, value)?;
    card.id = path.last().to_string();
    Ok(card)
}

pub async fn add_card(store: &dyn DocumentStore, account: &AccountId, draft: &CardDraft) -> CardResult<Card> {
    let mut card = draft.validate().map_err(CardError::Invalid)?;

    let parent = cards_path(account)?;
    card.id = store.push_child(&parent, store::encode(&parent, &card)?).await?;

    tracing::info!(account = %account, card = %card.id, number = %card.masked_number(), "card added");
    Ok(card)
}

pub async fn get_card(store: &dyn DocumentStore, account: &AccountId, card_id: &str) -> CardResult<Card> {
    let path = card_path(account, card_id)?;
    match store.read(&path).await? {
        Some(value) => Ok(decode_card(&path, value)?),
        None => Err(CardError::NotFound(card_id.to_string())),
    }
}

fn decode_cards(parent: &StorePath, value: Option<Value>) -> StoreResult<Vec<Card>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Value::Object(map) = value else {
        return Err(StoreError::Malformed {
            path: parent.to_string(),
            reason: "expected an object".into(),
        });
    };

    map.into_iter()
        .map(|(key, raw)| decode_card(&parent.child(&key)?, raw))
        .collect()
}

pub async fn list_cards(store: &dyn DocumentStore, account: &AccountId) -> CardResult<Vec<Card>> {
    let parent = cards_path(account)?;
    let value = store.read(&parent).await?;
    Ok(decode_cards(&parent, value)?)
}

/// Replaces the card's attributes. The card must already exist.
pub async fn update_card(
    store: &dyn DocumentStore,
    account: &AccountId,
    card_id: &str,
    draft: &CardDraft,
) -> CardResult<Card> {
    let mut card = draft.validate().map_err(CardError::Invalid)?;

    let path = card_path(account, card_id)?;
    if store.read(&path).await?.is_none() {
        return Err(CardError::NotFound(card_id.to_string()));
    }

    store.write(&path, store::encode(&path, &card)?).await?;
    card.id = card_id.to_string();
    Ok(card)
}

pub async fn delete_card(store: &dyn DocumentStore, account: &AccountId, card_id: &str) -> CardResult<()> {
    let path = card_path(account, card_id)?;
    if store.read(&path).await?.is_none() {
        return Err(CardError::NotFound(card_id.to_string()));
    }
    store.remove(&path).await?;

    tracing::info!(account = %account, card = %card_id, "card deleted");
    Ok(())
}

/// Cards whose number and holder label both match.
///
/// Numbers are not unique within an account, so the number query can return
/// several cards and the label narrows them down. Both are compared in the form
/// `CardDraft::validate` stores them in.
pub async fn find_by_label(
    store: &dyn DocumentStore,
    account: &AccountId,
    name: &str,
    number: &str,
) -> StoreResult<Option<Card>> {
    let parent = cards_path(account)?;
    let name = name.trim();
    let hits = store
        .find_children(&parent, "cardNumber", &Value::String(card::normalize_number(number)))
        .await?;

    for (key, raw) in hits {
        if raw.get("cardName").and_then(Value::as_str) == Some(name) {
            return decode_card(&parent.child(&key)?, raw).map(Some);
        }
    }
    Ok(None)
}

pub fn watch_cards(
    store: Arc<dyn DocumentStore>,
    account: &AccountId,
) -> StoreResult<BoxStream<'static, StoreResult<Vec<Card>>>> {
    let parent = cards_path(account)?;
    let stream = store::watch(store, parent.clone())
        .map(move |value| value.and_then(|v| decode_cards(&parent, v)))
        .boxed();
    Ok(stream)
}
