use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::{
    models::{AccountId, AccountProfile, AccountSummary, Money},
    store::{self, DocumentStore, StoreError, StorePath, StoreResult},
};

use super::auth_service::{self, AuthError, Authenticator, FieldErrors};

pub const ACCOUNTS: &str = "accounts";

pub fn account_path(account: &AccountId) -> StoreResult<StorePath> {
    StorePath::root(ACCOUNTS)?.child(account.as_str())
}

pub fn balance_path(account: &AccountId) -> StoreResult<StorePath> {
    account_path(account)?.child("balance")
}

pub fn interest_path(account: &AccountId) -> StoreResult<StorePath> {
    account_path(account)?.child("interest")
}

#[derive(thiserror::Error, Debug)]
pub enum AccountError {
    #[error("invalid input")]
    Invalid(FieldErrors),
    #[error("account {0} not found")]
    NotFound(AccountId),
    #[error("not signed in")]
    NotSignedIn,
    #[error(transparent)]
    Auth(AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthError> for AccountError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Invalid(errs) => AccountError::Invalid(errs),
            AuthError::EmailTaken => {
                let mut errs = FieldErrors::new();
                errs.insert("email".into(), "Email has already been taken!".into());
                AccountError::Invalid(errs)
            }
            AuthError::UnknownUser(id) => AccountError::NotFound(id),
            other => AccountError::Auth(other),
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errs = FieldErrors::new();

        if self.name.trim().is_empty() {
            errs.insert("name".into(), "Name is required.".into());
        }
        let email = auth_service::normalize_email(&self.email);
        if email.is_empty() {
            errs.insert("email".into(), "Email is required.".into());
        } else if !auth_service::is_valid_email(&email) {
            errs.insert("email".into(), "Invalid email.".into());
        }
        if self.password.chars().count() < auth_service::MIN_PASSWORD_LEN {
            errs.insert(
                "password".into(),
                format!("Password must be at least {} characters.", auth_service::MIN_PASSWORD_LEN),
            );
        } else if self.password != self.confirm_password {
            errs.insert("confirmPassword".into(), "Passwords do not match".into());
        }

        errs
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Writes the initial account document: zero balance, zero interest, no cards.
pub async fn create_account(
    store: &dyn DocumentStore,
    account: &AccountId,
    name: &str,
    email: &str,
) -> StoreResult<AccountProfile> {
    let profile = AccountProfile {
        id: String::new(),
        name: name.trim().to_string(),
        email: auth_service::normalize_email(email),
        balance: Money::zero(),
        interest: Money::zero(),
    };

    let path = account_path(account)?;
    store.write(&path, store::encode(&path, &profile)?).await?;

    Ok(AccountProfile {
        id: account.to_string(),
        ..profile
    })
}

/// Creates the identity, then the account document.
///
/// If the document cannot be written the fresh identity is removed again so the
/// email is not left claimed by an account that does not exist.
pub async fn register(
    store: &dyn DocumentStore,
    auth: &dyn Authenticator,
    form: &SignupForm,
) -> AccountResult<AccountProfile> {
    let errs = form.validate();
    if !errs.is_empty() {
        return Err(AccountError::Invalid(errs));
    }

    let id = auth.sign_up(&form.email, &form.password).await?;

    match create_account(store, &id, &form.name, &form.email).await {
        Ok(profile) => Ok(profile),
        Err(e) => {
            tracing::warn!(account = %id, error = %e, "failed to save user data; removing identity");
            if let Err(cleanup) = auth.delete_user(&id).await {
                tracing::warn!(account = %id, error = %cleanup, "identity cleanup failed");
            }
            Err(e.into())
        }
    }
}

pub async fn get_profile(store: &dyn DocumentStore, account: &AccountId) -> AccountResult<AccountProfile> {
    let path = account_path(account)?;
    let Some(value) = store.read(&path).await? else {
        return Err(AccountError::NotFound(account.clone()));
    };

    let mut profile: AccountProfile = store::decode(&path, value)?;
    profile.id = account.to_string();
    Ok(profile)
}

pub async fn summary(store: &dyn DocumentStore, account: &AccountId) -> AccountResult<AccountSummary> {
    let profile = get_profile(store, account).await?;
    Ok(AccountSummary {
        balance: profile.balance,
        interest: profile.interest,
    })
}

/// Rewrites the derived `interest` field from a known balance.
pub async fn refresh_interest(
    store: &dyn DocumentStore,
    account: &AccountId,
    balance: Money,
    rate: &BigDecimal,
) -> StoreResult<Money> {
    let interest = balance.apply_rate(rate);
    let path = interest_path(account)?;
    store.write(&path, store::encode(&path, &interest)?).await?;
    Ok(interest)
}

/// Identity first (email, then password when given), then the profile fields.
pub async fn update_profile(
    store: &dyn DocumentStore,
    auth: &dyn Authenticator,
    account: &AccountId,
    update: &ProfileUpdate,
) -> AccountResult<AccountProfile> {
    let mut errs = FieldErrors::new();
    let name = update.name.trim();
    let email = auth_service::normalize_email(&update.email);

    if name.is_empty() {
        errs.insert("name".into(), "Name is required.".into());
    }
    if !auth_service::is_valid_email(&email) {
        errs.insert("email".into(), "Invalid email.".into());
    }
    if !errs.is_empty() {
        return Err(AccountError::Invalid(errs));
    }

    let current = get_profile(store, account).await?;

    auth.update_email(account, &email).await?;
    if let Some(password) = update.password.as_deref().filter(|p| !p.is_empty()) {
        auth.update_password(account, password).await?;
    }

    let mut fields = Map::new();
    fields.insert("name".into(), json!(name));
    fields.insert("email".into(), Value::String(email.clone()));
    store.update_children(&account_path(account)?, fields).await?;

    tracing::info!(account = %account, "profile updated");
    Ok(AccountProfile {
        name: name.to_string(),
        email,
        ..current
    })
}

/// Removes the account subtree (cards and history included), then the identity.
pub async fn delete_account(
    store: &dyn DocumentStore,
    auth: &dyn Authenticator,
    account: &AccountId,
) -> AccountResult<()> {
    let path = account_path(account)?;
    if store.read(&path).await?.is_none() {
        return Err(AccountError::NotFound(account.clone()));
    }

    store.remove(&path).await?;
    auth.delete_user(account).await?;

    tracing::info!(account = %account, "account deleted");
    Ok(())
}
