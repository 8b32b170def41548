#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use pocketbank::{
    config::{self, Settings},
    models::{AccountId, Money},
    services::ledger_service::LedgerService,
    store::{DocumentStore, MemoryStore, StoreError, StorePath, StoreResult},
};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

pub fn settings() -> Settings {
    let mut settings = config::load();
    settings.bcrypt_cost = 4;
    settings.cas_max_attempts = 8;
    settings.jwt_secret = "test-secret".into();
    settings
}

pub fn money(raw: &str) -> Money {
    raw.parse().unwrap()
}

pub fn path(raw: &str) -> StorePath {
    StorePath::parse(raw).unwrap()
}

struct Rule {
    prefix: StorePath,
    // successful writes still allowed before the rule starts failing
    allow: usize,
}

/// MemoryStore wrapper that fails selected reads/writes and counts writes.
pub struct FlakyStore {
    inner: MemoryStore,
    write_rules: Mutex<Vec<Rule>>,
    read_rules: Mutex<Vec<StorePath>>,
    conflicts: AtomicBool,
    writes: AtomicUsize,
    // one-shot (trigger prefix, target path, value) applied right after a matching write
    interleave: Mutex<Option<(StorePath, StorePath, Value)>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        FlakyStore {
            inner: MemoryStore::new(),
            write_rules: Mutex::new(Vec::new()),
            read_rules: Mutex::new(Vec::new()),
            conflicts: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            interleave: Mutex::new(None),
        }
    }

    pub fn fail_writes(&self, prefix: &str) {
        self.fail_writes_after(prefix, 0);
    }

    pub fn fail_writes_after(&self, prefix: &str, allow: usize) {
        self.write_rules.lock().unwrap().push(Rule {
            prefix: path(prefix),
            allow,
        });
    }

    pub fn fail_reads(&self, prefix: &str) {
        self.read_rules.lock().unwrap().push(path(prefix));
    }

    /// Every compare-and-set reports a lost race.
    pub fn always_conflict(&self) {
        self.conflicts.store(true, Ordering::SeqCst);
    }

    /// After the next write under `trigger`, writes `value` at `target` as if
    /// another client had committed it in between.
    pub fn interleave_after(&self, trigger: &str, target: &str, value: Value) {
        *self.interleave.lock().unwrap() = Some((path(trigger), path(target), value));
    }

    pub fn clear_faults(&self) {
        self.write_rules.lock().unwrap().clear();
        self.read_rules.lock().unwrap().clear();
        self.conflicts.store(false, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, p: &StorePath) -> StoreResult<()> {
        let mut rules = self.write_rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if p.starts_with(&rule.prefix) {
                if rule.allow == 0 {
                    return Err(StoreError::Backend(format!("injected write failure at {p}")));
                }
                rule.allow -= 1;
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_read(&self, p: &StorePath) -> StoreResult<()> {
        let rules = self.read_rules.lock().unwrap();
        if rules.iter().any(|r| p.starts_with(r)) {
            return Err(StoreError::Backend(format!("injected read failure at {p}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn read(&self, p: &StorePath) -> StoreResult<Option<Value>> {
        self.check_read(p)?;
        // let concurrent operations interleave between read and write
        tokio::task::yield_now().await;
        self.inner.read(p).await
    }

    async fn write(&self, p: &StorePath, value: Value) -> StoreResult<()> {
        self.check_write(p)?;
        self.inner.write(p, value).await?;

        let pending = {
            let mut slot = self.interleave.lock().unwrap();
            match slot.as_ref() {
                Some((trigger, _, _)) if p.starts_with(trigger) => slot.take(),
                _ => None,
            }
        };
        if let Some((_, target, value)) = pending {
            self.inner.write(&target, value).await?;
        }
        Ok(())
    }

    async fn update_children(&self, p: &StorePath, fields: Map<String, Value>) -> StoreResult<()> {
        self.check_write(p)?;
        self.inner.update_children(p, fields).await
    }

    async fn remove(&self, p: &StorePath) -> StoreResult<()> {
        self.check_write(p)?;
        self.inner.remove(p).await
    }

    async fn find_children(&self, parent: &StorePath, field: &str, equals: &Value) -> StoreResult<Vec<(String, Value)>> {
        self.check_read(parent)?;
        self.inner.find_children(parent, field, equals).await
    }

    async fn compare_and_set(&self, p: &StorePath, expected: Option<&Value>, new: Value) -> StoreResult<bool> {
        if self.conflicts.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.check_write(p)?;
        self.inner.compare_and_set(p, expected, new).await
    }

    fn changes(&self) -> broadcast::Receiver<StorePath> {
        self.inner.changes()
    }
}

/// Seeds `accounts/{id}` with a balance and returns the id.
pub async fn seed_account(store: &dyn DocumentStore, id: &str, balance: &str) -> AccountId {
    store
        .write(
            &path(&format!("accounts/{id}")),
            json!({ "name": "Test", "email": format!("{id}@example.com"), "balance": money(balance) }),
        )
        .await
        .unwrap();
    AccountId::new(id)
}

/// Seeds a card and returns its id.
pub async fn seed_card(store: &dyn DocumentStore, account: &AccountId, name: &str, number: &str, balance: &str) -> String {
    store
        .push_child(
            &path(&format!("accounts/{account}/cards")),
            json!({ "cardType": "VISA", "cardNumber": number, "cardName": name, "balance": money(balance) }),
        )
        .await
        .unwrap()
}

pub fn ledger(store: Arc<dyn DocumentStore>) -> LedgerService {
    LedgerService::new(store, &settings())
}

// ---------------- HTTP helpers ----------------

pub fn test_app() -> axum::Router {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    pocketbank::routes::app(pocketbank::AppState::new(store, settings()))
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> axum::http::Request<axum::body::Body> {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    }
}

pub async fn response_json(res: axum::response::Response) -> Value {
    use http_body_util::BodyExt;

    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Signs up through the API and returns the bearer token.
pub async fn signup(app: &axum::Router, email: &str) -> String {
    use tower::ServiceExt;

    let body = json!({
        "name": "Ann",
        "email": email,
        "password": "secret1",
        "confirmPassword": "secret1",
    });
    let res = app
        .clone()
        .oneshot(json_request("POST", "/auth/signup", None, Some(body)))
        .await
        .unwrap();
    assert_eq!(res.status(), axum::http::StatusCode::CREATED);
    response_json(res).await["token"].as_str().unwrap().to_string()
}
