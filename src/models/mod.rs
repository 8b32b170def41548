pub mod money;
pub mod account;
pub mod card;
pub mod transaction;
pub mod user;

pub use money::Money;
pub use account::{AccountId, AccountProfile, AccountSummary};
pub use card::{Card, CardNetwork, CardSelector};
pub use transaction::{Transaction, TxKind};
pub use user::CurrentUser;
