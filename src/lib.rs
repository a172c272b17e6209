pub mod accounts;
pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod notifications;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::auth::{AuthError, CredentialStore, LoginThrottle, TokenService};
use crate::notifications::Mailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenService,
    pub credentials: CredentialStore,
    pub throttle: Arc<LoginThrottle>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, mailer: Arc<dyn Mailer>) -> Result<Self, AuthError> {
        let tokens = TokenService::from_config(&config.auth);
        let credentials = CredentialStore::from_config(&config.auth)?;
        let throttle = Arc::new(LoginThrottle::from_config(&config.auth.server_lockout));
        Ok(Self {
            config,
            db,
            tokens,
            credentials,
            throttle,
            mailer,
        })
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.db.clone(), self.credentials.clone())
    }
}
