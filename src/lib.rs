//! MedSAS Library
//!
//! Multi-tenant account, entitlement and ledger backend for healthcare
//! organizations.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};
use services::{EmailService, Mailer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Database connection pool
    pub db: DbPool,
    /// Outgoing mail transport
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config: Arc::new(config),
            db,
            mailer,
        }
    }

    pub fn email(&self) -> EmailService {
        EmailService::new(self.mailer.clone(), self.config.email.app_base_url.clone())
    }
}
