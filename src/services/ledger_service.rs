//! Money movement against the document store.
//!
//! The store only commits one path at a time, so every operation here is a
//! fixed sequence of single-path steps:
//!
//! * balances change through a read + compare-and-set loop, so two concurrent
//!   sends can never both spend the same funds;
//! * validation always happens before the first write;
//! * store failures abort the sequence and are not retried;
//! * a withdrawal debits the card before crediting the account, and re-credits
//!   the card if the account credit fails.

use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::{
    config::Settings,
    models::{AccountId, Card, CardSelector, Money, Transaction, TxKind},
    store::{self, DocumentStore, StoreError, StorePath},
};

use super::{account_service, card_service, transaction_service};

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Money, requested: Money },
    #[error("insufficient card balance: available {available}, requested {requested}")]
    InsufficientCardBalance { available: Money, requested: Money },
    #[error("card not found")]
    CardNotFound,
    #[error("store read failed: {0}")]
    StoreReadFailed(StoreError),
    #[error("store write failed: {0}")]
    StoreWriteFailed(StoreError),
    /// The balance change committed but its transaction record did not.
    #[error("{kind} of {amount} was applied but could not be recorded: {source}")]
    Unrecorded {
        kind: TxKind,
        amount: Money,
        source: StoreError,
    },
    /// The card was debited, the account credit failed, and so did the re-credit.
    #[error("{amount} debited from card {card_id} but not credited to the account: {source}")]
    Stranded {
        card_id: String,
        amount: Money,
        source: StoreError,
    },
    #[error("`{path}` kept changing; gave up after {attempts} attempts")]
    Contended { path: String, attempts: u32 },
    #[error("not signed in")]
    NotSignedIn,
}

impl LedgerError {
    /// Validation and lookup failures: nothing was written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::InsufficientCardBalance { .. }
                | LedgerError::CardNotFound
                | LedgerError::NotSignedIn
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub balance: Money,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawReceipt {
    pub card_id: String,
    pub card_balance: Money,
    pub balance: Money,
    pub transaction: Transaction,
}

/// Progress of a card-to-account withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawStage {
    Pending,
    Debited,
    Credited,
    Recorded,
    Compensating,
}

impl fmt::Display for WithdrawStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WithdrawStage::Pending => "pending",
            WithdrawStage::Debited => "debited",
            WithdrawStage::Credited => "credited",
            WithdrawStage::Recorded => "recorded",
            WithdrawStage::Compensating => "compensating",
        })
    }
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn DocumentStore>,
    interest_rate: BigDecimal,
    cas_max_attempts: u32,
}

impl LedgerService {
    pub fn new(store: Arc<dyn DocumentStore>, settings: &Settings) -> Self {
        Self {
            store,
            interest_rate: settings.interest_rate.clone(),
            cas_max_attempts: settings.cas_max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn balance(&self, account: &AccountId) -> LedgerResult<Money> {
        let path = account_service::balance_path(account).map_err(LedgerError::StoreReadFailed)?;
        let raw = self
            .store
            .read(&path)
            .await
            .map_err(LedgerError::StoreReadFailed)?;
        decode_money(&path, raw)
    }

    pub async fn add_balance(&self, account: &AccountId, amount: Money) -> LedgerResult<Receipt> {
        check_amount(amount)?;

        let path = account_service::balance_path(account).map_err(LedgerError::StoreWriteFailed)?;
        let balance = self
            .adjust(&path, |current| {
                current.checked_add(amount).ok_or(LedgerError::InvalidAmount)
            })
            .await?;

        tracing::info!(account = %account, %amount, %balance, "balance added");
        self.after_mutation(account, balance).await;

        let transaction = self.record(account, TxKind::Add, amount).await?;
        Ok(Receipt { balance, transaction })
    }

    pub async fn send_balance(&self, account: &AccountId, amount: Money) -> LedgerResult<Receipt> {
        check_amount(amount)?;

        let path = account_service::balance_path(account).map_err(LedgerError::StoreWriteFailed)?;
        let balance = self
            .adjust(&path, |current| {
                if amount > current {
                    return Err(LedgerError::InsufficientFunds {
                        balance: current,
                        requested: amount,
                    });
                }
                current.checked_sub(amount).ok_or(LedgerError::InvalidAmount)
            })
            .await?;

        tracing::info!(account = %account, %amount, %balance, "balance sent");
        self.after_mutation(account, balance).await;

        let transaction = self.record(account, TxKind::Send, amount).await?;
        Ok(Receipt { balance, transaction })
    }

    /// Moves `amount` from one of the account's cards into the account balance.
    pub async fn withdraw_to_card(
        &self,
        account: &AccountId,
        selector: &CardSelector,
        amount: Money,
    ) -> LedgerResult<WithdrawReceipt> {
        check_amount(amount)?;

        let card = self.resolve_card(account, selector).await?;
        if card.balance < amount {
            return Err(LedgerError::InsufficientCardBalance {
                available: card.balance,
                requested: amount,
            });
        }

        let card_balance_path = card_service::card_path(account, &card.id)
            .and_then(|p| p.child("balance"))
            .map_err(LedgerError::StoreWriteFailed)?;
        let account_balance_path =
            account_service::balance_path(account).map_err(LedgerError::StoreWriteFailed)?;

        let mut stage = WithdrawStage::Pending;

        // 1. debit the card, re-checking its balance against the fresh value
        let card_balance = self
            .adjust(&card_balance_path, |current| {
                if current < amount {
                    return Err(LedgerError::InsufficientCardBalance {
                        available: current,
                        requested: amount,
                    });
                }
                current.checked_sub(amount).ok_or(LedgerError::InvalidAmount)
            })
            .await?;
        stage = advance(stage, WithdrawStage::Debited, &card.id);

        // 2 + 3. fresh read of the account balance and credit it
        let credited = self
            .adjust(&account_balance_path, |current| {
                current.checked_add(amount).ok_or(LedgerError::InvalidAmount)
            })
            .await;

        let balance = match credited {
            Ok(balance) => balance,
            Err(e) => {
                advance(stage, WithdrawStage::Compensating, &card.id);
                return Err(self.compensate(&card, &card_balance_path, amount, e).await);
            }
        };
        stage = advance(stage, WithdrawStage::Credited, &card.id);

        tracing::info!(
            account = %account,
            card = %card.masked_number(),
            %amount,
            %balance,
            "withdrawn from card"
        );
        self.after_mutation(account, balance).await;

        // 4. record
        let transaction = self.record(account, TxKind::Withdraw, amount).await?;
        advance(stage, WithdrawStage::Recorded, &card.id);

        Ok(WithdrawReceipt {
            card_id: card.id,
            card_balance,
            balance,
            transaction,
        })
    }

    async fn resolve_card(&self, account: &AccountId, selector: &CardSelector) -> LedgerResult<Card> {
        match selector {
            CardSelector::Id(id) => match card_service::get_card(self.store.as_ref(), account, id).await {
                Ok(card) => Ok(card),
                Err(card_service::CardError::NotFound(_)) => Err(LedgerError::CardNotFound),
                Err(card_service::CardError::Store(e)) => Err(LedgerError::StoreReadFailed(e)),
                Err(card_service::CardError::Invalid(_)) => Err(LedgerError::CardNotFound),
            },
            CardSelector::Label { name, number } => {
                card_service::find_by_label(self.store.as_ref(), account, name, number)
                    .await
                    .map_err(LedgerError::StoreReadFailed)?
                    .ok_or(LedgerError::CardNotFound)
            }
        }
    }

    /// Re-credits the card after a failed account credit.
    async fn compensate(
        &self,
        card: &Card,
        card_balance_path: &StorePath,
        amount: Money,
        cause: LedgerError,
    ) -> LedgerError {
        let restored = self
            .adjust(card_balance_path, |current| {
                current.checked_add(amount).ok_or(LedgerError::InvalidAmount)
            })
            .await;

        match restored {
            Ok(card_balance) => {
                tracing::warn!(
                    card = %card.masked_number(),
                    %amount,
                    %card_balance,
                    error = %cause,
                    "account credit failed; card re-credited"
                );
                cause
            }
            Err(e) => {
                let source = match e {
                    LedgerError::StoreReadFailed(s) | LedgerError::StoreWriteFailed(s) => s,
                    other => StoreError::Backend(other.to_string()),
                };
                tracing::error!(
                    card = %card.masked_number(),
                    card_id = %card.id,
                    %amount,
                    error = %source,
                    "card debited but account not credited; manual reconciliation needed"
                );
                LedgerError::Stranded {
                    card_id: card.id.clone(),
                    amount,
                    source,
                }
            }
        }
    }

    /// Read + compare-and-set until the write lands on the value it was computed from.
    ///
    /// `apply` sees the freshly read value on every attempt, so validation errors
    /// always reflect current state and short-circuit before any write.
    async fn adjust<F>(&self, path: &StorePath, apply: F) -> LedgerResult<Money>
    where
        F: Fn(Money) -> LedgerResult<Money>,
    {
        for attempt in 1..=self.cas_max_attempts {
            let raw = self
                .store
                .read(path)
                .await
                .map_err(LedgerError::StoreReadFailed)?;
            let current = decode_money(path, raw.clone())?;
            let next = apply(current)?;

            let value = store::encode(path, &next).map_err(LedgerError::StoreWriteFailed)?;
            let written = self
                .store
                .compare_and_set(path, raw.as_ref(), value)
                .await
                .map_err(LedgerError::StoreWriteFailed)?;

            if written {
                return Ok(next);
            }
            tracing::debug!(path = %path, attempt, "balance changed underneath; retrying");
        }

        Err(LedgerError::Contended {
            path: path.to_string(),
            attempts: self.cas_max_attempts,
        })
    }

    async fn record(&self, account: &AccountId, kind: TxKind, amount: Money) -> LedgerResult<Transaction> {
        transaction_service::record(self.store.as_ref(), account, kind, amount)
            .await
            .map_err(|source| {
                tracing::warn!(account = %account, %kind, %amount, error = %source, "transaction not recorded");
                LedgerError::Unrecorded { kind, amount, source }
            })
    }

    /// Derived fields. Failures here never fail the mutation.
    async fn after_mutation(&self, account: &AccountId, balance: Money) {
        if let Err(e) = self.refresh_interest(account, balance).await {
            tracing::warn!(account = %account, error = %e, "interest not refreshed");
        }
    }

    /// Writes interest for `balance`, then re-reads the balance and repeats if
    /// it moved, so the last refresh to land always matches the stored balance.
    async fn refresh_interest(&self, account: &AccountId, mut balance: Money) -> LedgerResult<()> {
        for attempt in 1..=self.cas_max_attempts {
            account_service::refresh_interest(self.store.as_ref(), account, balance, &self.interest_rate)
                .await
                .map_err(LedgerError::StoreWriteFailed)?;

            let current = self.balance(account).await?;
            if current == balance {
                return Ok(());
            }
            tracing::debug!(account = %account, attempt, "balance moved during interest refresh");
            balance = current;
        }

        Err(LedgerError::Contended {
            path: account_service::interest_path(account)
                .map(|p| p.to_string())
                .unwrap_or_default(),
            attempts: self.cas_max_attempts,
        })
    }
}

fn check_amount(amount: Money) -> LedgerResult<()> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

fn decode_money(path: &StorePath, raw: Option<serde_json::Value>) -> LedgerResult<Money> {
    match raw {
        None => Ok(Money::zero()),
        Some(v) => store::decode(path, v).map_err(LedgerError::StoreReadFailed),
    }
}

fn advance(from: WithdrawStage, to: WithdrawStage, card_id: &str) -> WithdrawStage {
    tracing::debug!(card_id, %from, %to, "withdraw stage");
    to
}
