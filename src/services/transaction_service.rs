use std::sync::Arc;

use chrono::Utc;
use futures_util::{StreamExt, stream::BoxStream};
use serde_json::Value;

use crate::{
    models::{AccountId, Money, Transaction, TxKind},
    store::{self, DocumentStore, StorePath, StoreResult},
};

use super::account_service;

pub fn transactions_path(account: &AccountId) -> StoreResult<StorePath> {
    account_service::account_path(account)?.child("transactions")
}

/// Appends an immutable record; transactions are never updated or deleted here.
pub async fn record(
    store: &dyn DocumentStore,
    account: &AccountId,
    kind: TxKind,
    amount: Money,
) -> StoreResult<Transaction> {
    let parent = transactions_path(account)?;

    let mut tx = Transaction {
        id: String::new(),
        kind,
        amount,
        timestamp: Utc::now().timestamp_millis(),
    };

    let key = store.push_child(&parent, store::encode(&parent, &tx)?).await?;
    tx.id = key;
    Ok(tx)
}

fn decode_list(parent: &StorePath, value: Option<Value>) -> StoreResult<Vec<Transaction>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Value::Object(map) = value else {
        return Err(store::StoreError::Malformed {
            path: parent.to_string(),
            reason: "expected an object".into(),
        });
    };

    let mut out = Vec::with_capacity(map.len());
    for (key, raw) in map {
        let mut tx: Transaction = store::decode(&parent.child(&key)?, raw)?;
        tx.id = key;
        out.push(tx);
    }

    // newest first; keys are creation-ordered so they break timestamp ties
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    Ok(out)
}

pub async fn list_transactions(store: &dyn DocumentStore, account: &AccountId) -> StoreResult<Vec<Transaction>> {
    let parent = transactions_path(account)?;
    let value = store.read(&parent).await?;
    decode_list(&parent, value)
}

/// Live transaction history, newest first, re-emitted after every append.
pub fn watch_transactions(
    store: Arc<dyn DocumentStore>,
    account: &AccountId,
) -> StoreResult<BoxStream<'static, StoreResult<Vec<Transaction>>>> {
    let parent = transactions_path(account)?;
    let stream = store::watch(store, parent.clone())
        .map(move |value| value.and_then(|v| decode_list(&parent, v)))
        .boxed();
    Ok(stream)
}
