use serde::{Deserialize, Serialize};

use super::{AccountId, AccountProfile};

/// Injected into request extensions by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: AccountId,
    pub email: String,
    pub name: String,
}

impl From<AccountProfile> for CurrentUser {
    fn from(p: AccountProfile) -> Self {
        CurrentUser {
            id: AccountId::new(p.id),
            email: p.email,
            name: p.name,
        }
    }
}
