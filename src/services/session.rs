use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    config::Settings,
    models::{AccountId, AccountProfile, CardSelector, Money},
    store::DocumentStore,
};

use super::{
    account_service::{self, AccountError, AccountResult, SignupForm},
    auth_service::{AuthResult, Authenticator},
    ledger_service::{LedgerError, LedgerResult, LedgerService, Receipt, WithdrawReceipt},
};

/// One signed-in user on one device.
///
/// Holds the store and authenticator it was given and remembers the current
/// account id; wallet operations act on that account only.
pub struct Session {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn Authenticator>,
    ledger: LedgerService,
    current: RwLock<Option<AccountId>>,
}

impl Session {
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn Authenticator>, settings: &Settings) -> Self {
        let ledger = LedgerService::new(store.clone(), settings);
        Self {
            store,
            auth,
            ledger,
            current: RwLock::new(None),
        }
    }

    pub async fn current_account_id(&self) -> Option<AccountId> {
        self.current.read().await.clone()
    }

    pub async fn sign_up(&self, form: &SignupForm) -> AccountResult<AccountProfile> {
        let profile = account_service::register(self.store.as_ref(), self.auth.as_ref(), form).await?;
        *self.current.write().await = Some(AccountId::new(profile.id.clone()));
        Ok(profile)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AccountId> {
        let id = self.auth.sign_in(email, password).await?;
        *self.current.write().await = Some(id.clone());
        Ok(id)
    }

    pub async fn sign_out(&self) {
        *self.current.write().await = None;
    }

    /// Deletes the signed-in account and signs out.
    pub async fn delete_account(&self) -> AccountResult<()> {
        let Some(id) = self.current_account_id().await else {
            return Err(AccountError::NotSignedIn);
        };
        account_service::delete_account(self.store.as_ref(), self.auth.as_ref(), &id).await?;
        self.sign_out().await;
        Ok(())
    }

    async fn require_account(&self) -> LedgerResult<AccountId> {
        self.current_account_id().await.ok_or(LedgerError::NotSignedIn)
    }

    pub async fn balance(&self) -> LedgerResult<Money> {
        let id = self.require_account().await?;
        self.ledger.balance(&id).await
    }

    pub async fn add_balance(&self, amount: Money) -> LedgerResult<Receipt> {
        let id = self.require_account().await?;
        self.ledger.add_balance(&id, amount).await
    }

    pub async fn send_balance(&self, amount: Money) -> LedgerResult<Receipt> {
        let id = self.require_account().await?;
        self.ledger.send_balance(&id, amount).await
    }

    pub async fn withdraw_to_card(&self, selector: &CardSelector, amount: Money) -> LedgerResult<WithdrawReceipt> {
        let id = self.require_account().await?;
        self.ledger.withdraw_to_card(&id, selector, amount).await
    }
}
