//! Path-addressed document store boundary.
//!
//! The ledger only relies on single-path atomicity: every call here commits at
//! most one path (or one set of sibling fields for `update_children`). There is
//! no multi-path transaction; callers that touch several paths sequence the
//! calls themselves.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

pub mod memory;
pub mod mongo;
pub mod path;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use path::StorePath;

#[derive(thiserror::Error, Debug, Clone)]
pub enum StoreError {
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("value at `{path}` is malformed: {reason}")]
    Malformed { path: String, reason: String },
    #[error("operation not supported at `{path}`: {reason}")]
    Unsupported { path: String, reason: &'static str },
    #[error("unique key already taken: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Value at `path`, or `None` when nothing is stored there.
    async fn read(&self, path: &StorePath) -> StoreResult<Option<Value>>;

    /// Replaces the value at `path`. Writing `null` removes the node.
    async fn write(&self, path: &StorePath, value: Value) -> StoreResult<()>;

    /// Sets several direct children of `path` in one commit, leaving others untouched.
    async fn update_children(&self, path: &StorePath, fields: Map<String, Value>) -> StoreResult<()>;

    async fn remove(&self, path: &StorePath) -> StoreResult<()>;

    /// Direct children of `parent` whose `field` equals `equals`, as `(key, value)` pairs.
    async fn find_children(
        &self,
        parent: &StorePath,
        field: &str,
        equals: &Value,
    ) -> StoreResult<Vec<(String, Value)>>;

    /// Writes `new` only if the current value equals `expected` (`None` meaning absent).
    /// Returns whether the write happened.
    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<&Value>,
        new: Value,
    ) -> StoreResult<bool>;

    /// Paths touched by committed writes made through this handle.
    fn changes(&self) -> broadcast::Receiver<StorePath>;

    /// Generated child key. Keys sort in creation order.
    fn new_key(&self) -> String {
        ObjectId::new().to_hex()
    }

    /// Appends `value` under a freshly generated key and returns that key.
    async fn push_child(&self, parent: &StorePath, value: Value) -> StoreResult<String> {
        let key = self.new_key();
        self.write(&parent.child(&key)?, value).await?;
        Ok(key)
    }

    /// Direct children of `parent` as `(key, value)` pairs, in key order.
    async fn children(&self, parent: &StorePath) -> StoreResult<Vec<(String, Value)>> {
        match self.read(parent).await? {
            None => Ok(Vec::new()),
            Some(Value::Object(map)) => Ok(map.into_iter().collect()),
            Some(_) => Err(StoreError::Malformed {
                path: parent.to_string(),
                reason: "expected an object".into(),
            }),
        }
    }
}

pub type ValueStream = BoxStream<'static, StoreResult<Option<Value>>>;

struct Watcher {
    store: Arc<dyn DocumentStore>,
    path: StorePath,
    rx: broadcast::Receiver<StorePath>,
    primed: bool,
}

/// Live view of `path`: yields the current value, then the fresh value after
/// every related change, until the stream is dropped.
pub fn watch(store: Arc<dyn DocumentStore>, path: StorePath) -> ValueStream {
    let rx = store.changes();
    let watcher = Watcher {
        store,
        path,
        rx,
        primed: false,
    };

    stream::unfold(watcher, |mut w| async move {
        if !w.primed {
            w.primed = true;
            let value = w.store.read(&w.path).await;
            return Some((value, w));
        }

        loop {
            match w.rx.recv().await {
                Ok(changed) if changed.is_related(&w.path) => break,
                Ok(_) => continue,
                // missed notifications; re-read to resync
                Err(RecvError::Lagged(_)) => break,
                Err(RecvError::Closed) => return None,
            }
        }

        let value = w.store.read(&w.path).await;
        Some((value, w))
    })
    .boxed()
}

/// Decodes a stored JSON value into `T`, reporting the path on failure.
pub fn decode<T: serde::de::DeserializeOwned>(path: &StorePath, value: Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

pub fn encode<T: serde::Serialize>(path: &StorePath, value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
