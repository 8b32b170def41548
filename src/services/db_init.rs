use mongodb::{
    Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};

use crate::store::{StoreError, StoreResult};

use super::auth_service::CREDENTIALS;

/// Indexes the Mongo backend relies on. Safe to run on every start.
pub async fn ensure_indexes(db: &Database) -> StoreResult<()> {
    // second line behind the email claims: one credential per address
    let credentials_email = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();

    db.collection::<Document>(CREDENTIALS)
        .create_index(credentials_email, None)
        .await
        .map_err(|e| StoreError::Backend(format!("creating {CREDENTIALS} index: {e}")))?;

    tracing::debug!("indexes ready");
    Ok(())
}
