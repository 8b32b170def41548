use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    config::Settings,
    models::AccountId,
    store::{DocumentStore, StoreError, StorePath},
};

/// Field name -> message. `_form` carries messages that belong to no single field.
pub type FieldErrors = HashMap<String, String>;

pub const MIN_PASSWORD_LEN: usize = 6;

pub const CREDENTIALS: &str = "credentials";
const EMAIL_CLAIMS: &str = "credential_emails";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid input")]
    Invalid(FieldErrors),
    #[error("email has already been taken")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no user with id {0}")]
    UnknownUser(AccountId),
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type AuthResult<T> = Result<T, AuthError>;

fn field_error(field: &str, msg: &str) -> AuthError {
    let mut errs = FieldErrors::new();
    errs.insert(field.into(), msg.into());
    AuthError::Invalid(errs)
}

/// Identity provider. Issues the account ids the ledger keys everything on.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AccountId>;

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AccountId>;

    async fn update_email(&self, id: &AccountId, email: &str) -> AuthResult<()>;

    async fn update_password(&self, id: &AccountId, password: &str) -> AuthResult<()>;

    async fn delete_user(&self, id: &AccountId) -> AuthResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credential {
    email: String,
    password_hash: String,
}

/// Email/password accounts kept in the document store under `credentials/{id}`,
/// with bcrypt hashes.
///
/// Each address is also claimed at `credential_emails/{email}/owner` with a
/// compare-and-set before anything else is written, so two sign-ups racing for
/// the same address cannot both succeed. Sign-in resolves the address through
/// that claim.
pub struct PasswordAuthenticator {
    store: Arc<dyn DocumentStore>,
    cost: u32,
}

impl PasswordAuthenticator {
    pub fn new(store: Arc<dyn DocumentStore>, cost: u32) -> Self {
        Self { store, cost }
    }

    fn path(id: &AccountId) -> Result<StorePath, StoreError> {
        StorePath::root(CREDENTIALS)?.child(id.as_str())
    }

    fn claim_path(email: &str) -> Result<StorePath, StoreError> {
        StorePath::root(EMAIL_CLAIMS)?
            .child(&escape_key(email))?
            .child("owner")
    }

    async fn claim_email(&self, email: &str, id: &AccountId) -> AuthResult<()> {
        let path = Self::claim_path(email)?;
        if self
            .store
            .compare_and_set(&path, None, json!(id.as_str()))
            .await?
        {
            return Ok(());
        }
        Err(AuthError::EmailTaken)
    }

    /// Drops the claim if `id` still holds it.
    async fn release_email(&self, email: &str, id: &AccountId) -> AuthResult<()> {
        let path = Self::claim_path(email)?;
        self.store
            .compare_and_set(&path, Some(&json!(id.as_str())), Value::Null)
            .await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<(AccountId, Credential)>> {
        let claim = Self::claim_path(email)?;
        let Some(owner) = self.store.read(&claim).await? else {
            return Ok(None);
        };
        let owner: AccountId = crate::store::decode(&claim, owner)?;

        let path = Self::path(&owner)?;
        let Some(value) = self.store.read(&path).await? else {
            return Ok(None);
        };
        let cred: Credential = crate::store::decode(&path, value)?;

        // a claim left by an unfinished change does not sign in another address
        if cred.email != email {
            return Ok(None);
        }
        Ok(Some((owner, cred)))
    }

    async fn load_credential(&self, id: &AccountId) -> AuthResult<(StorePath, Credential)> {
        let path = Self::path(id)?;
        match self.store.read(&path).await? {
            Some(value) => {
                let cred = crate::store::decode(&path, value)?;
                Ok((path, cred))
            }
            None => Err(AuthError::UnknownUser(id.clone())),
        }
    }

    async fn write_credential(&self, id: &AccountId, email: &str, password: &str) -> AuthResult<()> {
        let cred = Credential {
            email: email.to_string(),
            password_hash: hash(password, self.cost)?,
        };

        let path = Self::path(id)?;
        self.store
            .write(&path, crate::store::encode(&path, &cred)?)
            .await
            .map_err(taken_on_conflict)
    }

    fn check_email(email: &str) -> AuthResult<()> {
        if email.is_empty() {
            return Err(field_error("email", "Email is required."));
        }
        if !is_valid_email(email) {
            return Err(field_error("email", "Invalid email."));
        }
        Ok(())
    }

    fn check_password(password: &str) -> AuthResult<()> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(field_error(
                "password",
                &format!("Password must be at least {MIN_PASSWORD_LEN} characters."),
            ));
        }
        Ok(())
    }
}

/// A unique-index violation on the credential's email is another holder of the address.
fn taken_on_conflict(e: StoreError) -> AuthError {
    match e {
        StoreError::Conflict(_) => AuthError::EmailTaken,
        other => other.into(),
    }
}

/// Path-safe form of an email address: `%XX` for the characters a segment may not hold.
fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '.' | '$' | '#' | '[' | ']' | '/' | '%' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AccountId> {
        let email = normalize_email(email);
        Self::check_email(&email)?;
        Self::check_password(password)?;

        let id = AccountId::new(self.store.new_key());
        self.claim_email(&email, &id).await?;

        if let Err(e) = self.write_credential(&id, &email, password).await {
            if let Err(cleanup) = self.release_email(&email, &id).await {
                tracing::warn!(account = %id, error = %cleanup, "email claim not released");
            }
            return Err(e);
        }

        tracing::info!(account = %id, "user signed up");
        Ok(id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AccountId> {
        let email = normalize_email(email);

        let Some((id, cred)) = self.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify(password, &cred.password_hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(id)
    }

    async fn update_email(&self, id: &AccountId, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        Self::check_email(&email)?;
        let (path, cred) = self.load_credential(id).await?;

        if cred.email == email {
            return Ok(());
        }
        self.claim_email(&email, id).await?;

        let mut fields = Map::new();
        fields.insert("email".into(), json!(email));
        if let Err(e) = self.store.update_children(&path, fields).await {
            if let Err(cleanup) = self.release_email(&email, id).await {
                tracing::warn!(account = %id, error = %cleanup, "email claim not released");
            }
            return Err(taken_on_conflict(e));
        }

        if let Err(e) = self.release_email(&cred.email, id).await {
            tracing::warn!(account = %id, error = %e, "previous email claim not released");
        }
        Ok(())
    }

    async fn update_password(&self, id: &AccountId, password: &str) -> AuthResult<()> {
        Self::check_password(password)?;
        let (path, _) = self.load_credential(id).await?;

        let mut fields = Map::new();
        fields.insert("passwordHash".into(), json!(hash(password, self.cost)?));
        self.store.update_children(&path, fields).await?;
        Ok(())
    }

    async fn delete_user(&self, id: &AccountId) -> AuthResult<()> {
        let (path, cred) = match self.load_credential(id).await {
            Ok(found) => found,
            Err(AuthError::UnknownUser(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.store.remove(&path).await?;
        self.release_email(&cred.email, id).await
    }
}

// ---------------- Session tokens ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    // account id
    pub sub: String,
    // expiry (unix timestamp seconds)
    pub exp: usize,
}

pub fn issue_token(settings: &Settings, id: &AccountId) -> AuthResult<String> {
    let exp = (Utc::now() + Duration::days(settings.token_days)).timestamp() as usize;

    let claims = Claims {
        sub: id.to_string(),
        exp,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )?)
}

pub fn verify_token(settings: &Settings, token: &str) -> AuthResult<AccountId> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &validation,
    )?;

    Ok(AccountId::new(data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config, store::MemoryStore};

    fn authenticator() -> PasswordAuthenticator {
        PasswordAuthenticator::new(Arc::new(MemoryStore::new()), 4)
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("ann@example.com"));
        assert!(!is_valid_email("ann@example"));
        assert!(!is_valid_email("ann example@x.io"));
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = authenticator();
        let id = auth.sign_up("Ann@Example.com", "secret1").await.unwrap();

        assert_eq!(auth.sign_in("ann@example.com", "secret1").await.unwrap(), id);
        assert!(matches!(
            auth.sign_in("ann@example.com", "wrong-pw").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("bob@example.com", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicates_and_weak_input() {
        let auth = authenticator();
        auth.sign_up("ann@example.com", "secret1").await.unwrap();

        assert!(matches!(
            auth.sign_up("ANN@example.com", "secret2").await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            auth.sign_up("not-an-email", "secret1").await,
            Err(AuthError::Invalid(e)) if e.contains_key("email")
        ));
        assert!(matches!(
            auth.sign_up("bob@example.com", "123").await,
            Err(AuthError::Invalid(e)) if e.contains_key("password")
        ));
    }

    #[tokio::test]
    async fn credentials_can_be_changed() {
        let auth = authenticator();
        let id = auth.sign_up("ann@example.com", "secret1").await.unwrap();

        auth.update_email(&id, "ann@new.io").await.unwrap();
        auth.update_password(&id, "secret2").await.unwrap();

        assert_eq!(auth.sign_in("ann@new.io", "secret2").await.unwrap(), id);
        assert!(auth.sign_in("ann@example.com", "secret2").await.is_err());

        auth.delete_user(&id).await.unwrap();
        assert!(matches!(
            auth.update_password(&id, "secret3").await,
            Err(AuthError::UnknownUser(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_sign_ups_for_one_email_admit_one() {
        for round in 0..20 {
            let auth = Arc::new(authenticator());
            let email = format!("ann{round}@example.com");

            let a = tokio::spawn({
                let auth = auth.clone();
                let email = email.clone();
                async move { auth.sign_up(&email, "secret1").await }
            });
            let b = tokio::spawn({
                let auth = auth.clone();
                let email = email.clone();
                async move { auth.sign_up(&email, "secret2").await }
            });
            let results = [a.await.unwrap(), b.await.unwrap()];

            let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(winners.len(), 1, "round {round}");
            assert!(
                results.iter().any(|r| matches!(r, Err(AuthError::EmailTaken))),
                "round {round}"
            );

            let signed_in = match auth.sign_in(&email, "secret1").await {
                Ok(id) => id,
                Err(_) => auth.sign_in(&email, "secret2").await.unwrap(),
            };
            assert_eq!(&signed_in, winners[0]);
        }
    }

    #[tokio::test]
    async fn changed_and_deleted_emails_are_released() {
        let auth = authenticator();
        let ann = auth.sign_up("ann@example.com", "secret1").await.unwrap();
        let bob = auth.sign_up("bob@example.com", "secret1").await.unwrap();

        assert!(matches!(
            auth.update_email(&bob, "ann@example.com").await,
            Err(AuthError::EmailTaken)
        ));
        assert_eq!(auth.sign_in("bob@example.com", "secret1").await.unwrap(), bob);

        auth.update_email(&ann, "ann@new.io").await.unwrap();
        auth.update_email(&bob, "ann@example.com").await.unwrap();
        assert_eq!(auth.sign_in("ann@example.com", "secret1").await.unwrap(), bob);

        auth.delete_user(&ann).await.unwrap();
        let again = auth.sign_up("ann@new.io", "secret1").await.unwrap();
        assert_ne!(again, ann);
    }

    #[test]
    fn email_keys_are_valid_segments() {
        assert_eq!(escape_key("a.b$c#d[e]f/g%h"), "a%2Eb%24c%23d%5Be%5Df%2Fg%25h");
        assert!(PasswordAuthenticator::claim_path("ann.lee@example.com").is_ok());
    }

    #[test]
    fn token_round_trip_and_tamper() {
        let settings = config::load();
        let id = AccountId::new("abc123");

        let token = issue_token(&settings, &id).unwrap();
        assert_eq!(verify_token(&settings, &token).unwrap(), id);

        let mut other = settings.clone();
        other.jwt_secret = "another-secret".into();
        assert!(verify_token(&other, &token).is_err());
    }
}
