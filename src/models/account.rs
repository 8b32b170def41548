use std::fmt;

use serde::{Deserialize, Serialize};

use super::Money;

/// Opaque identifier issued by the authenticator. Stable for the account's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The account document at `accounts/{id}`, without its `cards` and
/// `transactions` children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub balance: Money,
    #[serde(default)]
    pub interest: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub balance: Money,
    pub interest: Money,
}
