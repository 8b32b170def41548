use std::fmt;

use serde::{Deserialize, Serialize};

use super::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Add,
    Send,
    Withdraw,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxKind::Add => "add",
            TxKind::Send => "send",
            TxKind::Withdraw => "withdraw",
        })
    }
}

/// Append-only record under `accounts/{id}/transactions/{txId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: TxKind,
    pub amount: Money,

    // milliseconds since epoch
    pub timestamp: i64,
}
