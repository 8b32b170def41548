use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardNetwork {
    Visa,
    Mastercard,
}

impl CardNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardNetwork::Visa => "VISA",
            CardNetwork::Mastercard => "MASTERCARD",
        }
    }
}

impl fmt::Display for CardNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VISA" => Ok(CardNetwork::Visa),
            "MASTERCARD" => Ok(CardNetwork::Mastercard),
            other => Err(format!("unsupported card type `{other}`")),
        }
    }
}

/// A card stored at `accounts/{id}/cards/{cardId}`.
///
/// `id` is the store-generated key; it is filled in from the path on read and
/// never written into the document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    pub card_type: CardNetwork,
    pub card_number: String,
    pub card_name: String,

    #[serde(default)]
    pub balance: Money,
}

impl Card {
    /// Card number reduced to its last four digits, safe for logs.
    pub fn masked_number(&self) -> String {
        mask_number(&self.card_number)
    }
}

/// Card number as stored: grouping whitespace removed.
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn mask_number(number: &str) -> String {
    let digits: Vec<char> = normalize_number(number).chars().collect();
    let tail: String = digits.iter().skip(digits.len().saturating_sub(4)).collect();
    format!("**** {tail}")
}

/// How a withdrawal names its source card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardSelector {
    /// The store-generated card key.
    Id(String),
    /// Number and holder label; both must match.
    Label { name: String, number: String },
}

impl fmt::Display for CardSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardSelector::Id(id) => write!(f, "card {id}"),
            CardSelector::Label { name, number } => write!(f, "card '{name}' {}", mask_number(number)),
        }
    }
}
