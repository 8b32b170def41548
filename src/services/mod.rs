pub mod db_init;

pub mod auth_service;
pub mod account_service;
pub mod card_service;
pub mod transaction_service;
pub mod ledger_service;
pub mod session;
