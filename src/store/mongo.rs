use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    Database,
    bson::{self, Bson, Document, doc},
    error::{ErrorKind, WriteFailure},
    options::{FindOneOptions, ReplaceOptions, UpdateOptions},
};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::{DocumentStore, StoreError, StorePath, StoreResult};

/// Maps the path tree onto MongoDB: the first segment names the collection,
/// the second is the document `_id`, and the rest is a dotted field path.
///
/// `changes()` only reports writes made through this handle; other processes
/// writing the same database are not observed.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
    changes_tx: broadcast::Sender<StorePath>,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        let (changes_tx, _) = broadcast::channel(256);
        MongoStore { db, changes_tx }
    }

    fn notify(&self, path: &StorePath) {
        let _ = self.changes_tx.send(path.clone());
    }

    fn collection(&self, path: &StorePath) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(&path.segments()[0])
    }
}

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY,
        ErrorKind::Command(c) => c.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn backend(e: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&e) {
        return StoreError::Conflict(e.to_string());
    }
    StoreError::Backend(e.to_string())
}

fn to_bson(path: &StorePath, value: &Value) -> StoreResult<Bson> {
    bson::to_bson(value).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn to_json(value: Bson) -> Value {
    value.into_relaxed_extjson()
}

/// Document body without its `_id`, as JSON.
fn doc_to_json(mut d: Document) -> Value {
    d.remove("_id");
    to_json(Bson::Document(d))
}

fn field_path(path: &StorePath) -> String {
    path.segments()[2..].join(".")
}

fn doc_id(path: &StorePath) -> &str {
    &path.segments()[1]
}

fn walk(d: &Document, fields: &[String]) -> Option<Bson> {
    let (head, rest) = fields.split_first()?;
    let v = d.get(head)?;
    if rest.is_empty() {
        return Some(v.clone());
    }
    match v {
        Bson::Document(inner) => walk(inner, rest),
        _ => None,
    }
}

/// Single conditional update for `compare_and_set`. Expecting absence upserts,
/// since the field may sit on a missing document; a concurrent creator then
/// makes the insert fail on `_id`.
fn cas_update(
    path: &StorePath,
    expected: Option<&Value>,
    new: &Value,
) -> StoreResult<(Document, Document, UpdateOptions)> {
    let field = field_path(path);
    let mut filter = doc! { "_id": doc_id(path) };
    match expected {
        Some(v) => filter.insert(field.clone(), to_bson(path, v)?),
        None => filter.insert(field.clone(), doc! { "$exists": false }),
    };

    let update = if new.is_null() {
        doc! { "$unset": { field: "" } }
    } else {
        doc! { "$set": { field: to_bson(path, new)? } }
    };

    let opts = UpdateOptions::builder().upsert(expected.is_none()).build();
    Ok((filter, update, opts))
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn read(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        let col = self.collection(path);

        match path.depth() {
            1 => {
                let mut cursor = col.find(None, None).await.map_err(backend)?;
                let mut out = Map::new();
                while let Some(mut d) = cursor.try_next().await.map_err(backend)? {
                    let id = match d.remove("_id") {
                        Some(Bson::String(s)) => s,
                        Some(other) => other.to_string(),
                        None => continue,
                    };
                    out.insert(id, doc_to_json(d));
                }
                Ok((!out.is_empty()).then_some(Value::Object(out)))
            }
            2 => {
                let found = col
                    .find_one(doc! { "_id": doc_id(path) }, None)
                    .await
                    .map_err(backend)?;
                Ok(found.map(doc_to_json))
            }
            _ => {
                let opts = FindOneOptions::builder()
                    .projection(doc! { field_path(path): 1 })
                    .build();
                let found = col
                    .find_one(doc! { "_id": doc_id(path) }, opts)
                    .await
                    .map_err(backend)?;
                Ok(found
                    .and_then(|d| walk(&d, &path.segments()[2..]))
                    .map(to_json))
            }
        }
    }

    async fn write(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        if value.is_null() {
            return self.remove(path).await;
        }
        let col = self.collection(path);

        match path.depth() {
            1 => {
                return Err(StoreError::Unsupported {
                    path: path.to_string(),
                    reason: "cannot overwrite a whole collection",
                });
            }
            2 => {
                let Bson::Document(mut body) = to_bson(path, &value)? else {
                    return Err(StoreError::Malformed {
                        path: path.to_string(),
                        reason: "a document must be an object".into(),
                    });
                };
                body.insert("_id", doc_id(path));
                col.replace_one(
                    doc! { "_id": doc_id(path) },
                    body,
                    ReplaceOptions::builder().upsert(true).build(),
                )
                .await
                .map_err(backend)?;
            }
            _ => {
                let v = to_bson(path, &value)?;
                col.update_one(
                    doc! { "_id": doc_id(path) },
                    doc! { "$set": { field_path(path): v } },
                    UpdateOptions::builder().upsert(true).build(),
                )
                .await
                .map_err(backend)?;
            }
        }

        self.notify(path);
        Ok(())
    }

    async fn update_children(&self, path: &StorePath, fields: Map<String, Value>) -> StoreResult<()> {
        if path.depth() < 2 {
            return Err(StoreError::Unsupported {
                path: path.to_string(),
                reason: "update_children needs a document path",
            });
        }

        let mut set = Document::new();
        let mut unset = Document::new();
        for (k, v) in fields {
            let child = path.child(&k)?;
            let key = field_path(&child);
            if v.is_null() {
                unset.insert(key, "");
            } else {
                set.insert(key, to_bson(&child, &v)?);
            }
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        if update.is_empty() {
            return Ok(());
        }

        self.collection(path)
            .update_one(
                doc! { "_id": doc_id(path) },
                update,
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(backend)?;

        self.notify(path);
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> StoreResult<()> {
        let col = self.collection(path);

        match path.depth() {
            1 => {
                col.delete_many(doc! {}, None).await.map_err(backend)?;
            }
            2 => {
                col.delete_one(doc! { "_id": doc_id(path) }, None)
                    .await
                    .map_err(backend)?;
            }
            _ => {
                col.update_one(
                    doc! { "_id": doc_id(path) },
                    doc! { "$unset": { field_path(path): "" } },
                    None,
                )
                .await
                .map_err(backend)?;
            }
        }

        self.notify(path);
        Ok(())
    }

    async fn find_children(
        &self,
        parent: &StorePath,
        field: &str,
        equals: &Value,
    ) -> StoreResult<Vec<(String, Value)>> {
        if parent.depth() == 1 {
            // top-level children are documents, so the query can use an index
            let filter = doc! { field: to_bson(parent, equals)? };
            let mut cursor = self
                .collection(parent)
                .find(filter, None)
                .await
                .map_err(backend)?;

            let mut out = Vec::new();
            while let Some(mut d) = cursor.try_next().await.map_err(backend)? {
                if let Some(Bson::String(id)) = d.remove("_id") {
                    out.push((id, doc_to_json(d)));
                }
            }
            return Ok(out);
        }

        // nested maps are filtered client-side
        Ok(self
            .children(parent)
            .await?
            .into_iter()
            .filter(|(_, child)| child.get(field) == Some(equals))
            .collect())
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<&Value>,
        new: Value,
    ) -> StoreResult<bool> {
        if path.depth() < 3 {
            return Err(StoreError::Unsupported {
                path: path.to_string(),
                reason: "compare_and_set needs a field path",
            });
        }

        let (filter, update, opts) = cas_update(path, expected, &new)?;
        let res = match self.collection(path).update_one(filter, update, opts).await {
            Ok(res) => res,
            Err(e) if is_duplicate_key(&e) => return Ok(false),
            Err(e) => return Err(backend(e)),
        };
        let applied = res.matched_count == 1 || res.upserted_id.is_some();

        if applied {
            self.notify(path);
        }
        Ok(applied)
    }

    fn changes(&self) -> broadcast::Receiver<StorePath> {
        self.changes_tx.subscribe()
    }
}
