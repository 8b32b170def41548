//! Library entrypoint for pocketbank.
//!
//! The binary only wires configuration, logging and the listener; everything
//! else lives here so integration tests under `tests/` can build the same
//! state, routers and services.

use std::sync::Arc;

pub mod config;
pub mod models;
pub mod store;

#[path = "middleware/auth.rs"]
pub mod auth;

pub mod services;

pub mod controllers;
pub mod routes;

use services::{
    auth_service::{Authenticator, PasswordAuthenticator},
    ledger_service::LedgerService,
};
use store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn Authenticator>,
    pub ledger: LedgerService,
    pub settings: config::Settings,
}

impl AppState {
    /// State with the password authenticator backed by the same store.
    pub fn new(store: Arc<dyn DocumentStore>, settings: config::Settings) -> Self {
        let auth = Arc::new(PasswordAuthenticator::new(store.clone(), settings.bcrypt_cost));
        Self::with_authenticator(store, auth, settings)
    }

    pub fn with_authenticator(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn Authenticator>,
        settings: config::Settings,
    ) -> Self {
        let ledger = LedgerService::new(store.clone(), &settings);
        AppState {
            store,
            auth,
            ledger,
            settings,
        }
    }
}
