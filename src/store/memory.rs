use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, broadcast};

use super::{DocumentStore, StoreError, StorePath, StoreResult};

/// In-process JSON tree. Used by tests and by the `memory` backend.
///
/// Follows the usual realtime-database conventions: writing `null` deletes,
/// and objects left empty by a delete are pruned.
pub struct MemoryStore {
    root: RwLock<Value>,
    changes_tx: broadcast::Sender<StorePath>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(256);
        MemoryStore {
            root: RwLock::new(Value::Object(Map::new())),
            changes_tx,
        }
    }

    fn notify(&self, path: &StorePath) {
        // no subscribers is fine
        let _ = self.changes_tx.send(path.clone());
    }
}

fn get<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for s in segments {
        node = node.as_object()?.get(s)?;
    }
    Some(node)
}

fn set(root: &mut Value, segments: &[String], value: Value) {
    if value.is_null() || value.as_object().is_some_and(Map::is_empty) {
        remove(root, segments);
        return;
    }

    let mut node = root;
    for s in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(s.clone()).or_insert(Value::Null),
            _ => unreachable!("replaced with an object above"),
        };
    }
    *node = value;
}

/// Removes the node and prunes parents left empty. Returns true when `node` is now empty.
fn remove(node: &mut Value, segments: &[String]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return true;
    };
    let Value::Object(map) = node else {
        return false;
    };

    let child_empty = match map.get_mut(head) {
        Some(child) if !rest.is_empty() => remove(child, rest),
        Some(_) => true,
        None => false,
    };
    if child_empty {
        map.remove(head);
    }
    map.is_empty()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        let root = self.root.read().await;
        Ok(get(&root, path.segments()).cloned())
    }

    async fn write(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        {
            let mut root = self.root.write().await;
            set(&mut root, path.segments(), value);
        }
        self.notify(path);
        Ok(())
    }

    async fn update_children(&self, path: &StorePath, fields: Map<String, Value>) -> StoreResult<()> {
        let children = fields
            .into_iter()
            .map(|(k, v)| path.child(&k).map(|p| (p, v)))
            .collect::<StoreResult<Vec<_>>>()?;

        {
            let mut root = self.root.write().await;
            for (p, v) in children {
                set(&mut root, p.segments(), v);
            }
        }
        self.notify(path);
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> StoreResult<()> {
        {
            let mut root = self.root.write().await;
            remove(&mut root, path.segments());
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
        let root = self.root.read().await;
        let Some(node) = get(&root, parent.segments()) else {
            return Ok(Vec::new());
        };
        let Some(map) = node.as_object() else {
            return Err(StoreError::Malformed {
                path: parent.to_string(),
                reason: "expected an object".into(),
            });
        };

        Ok(map
            .iter()
            .filter(|(_, child)| child.get(field) == Some(equals))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<&Value>,
        new: Value,
    ) -> StoreResult<bool> {
        {
            let mut root = self.root.write().await;
            if get(&root, path.segments()) != expected {
                return Ok(false);
            }
            set(&mut root, path.segments(), new);
        }
        self.notify(path);
        Ok(true)
    }

    fn changes(&self) -> broadcast::Receiver<StorePath> {
        self.changes_tx.subscribe()
    }
}
