pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;
use actix_web::HttpResponse;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use auth::{AuthenticationService, RateLimiter, RateLimitConfig, StaticCredentials};
pub use db::{InMemoryRefreshStore, PgRefreshStore, RefreshRecord, RefreshStore};

use crate::config::StoreBackend;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth: Arc<AuthenticationService>,
}

impl AppState {
    /// Builds the store named by the configuration and seeds the development
    /// credential collaborator from `users`.
    pub async fn new(config: Settings) -> Result<Self> {
        let store: Arc<dyn RefreshStore> = match config.store.backend {
            StoreBackend::Memory => {
                info!("Using in-memory refresh token store");
                Arc::new(InMemoryRefreshStore::new())
            }
            StoreBackend::Postgres => {
                let store = PgRefreshStore::new_with_options(
                    &config.store.database_url,
                    config.store.max_connections,
                    Duration::from_secs(5),
                )
                .await?;
                store.migrate().await?;
                info!("Using PostgreSQL refresh token store");
                Arc::new(store)
            }
        };

        let credentials = Arc::new(StaticCredentials::new(&config.users));
        info!("Loaded {} development accounts", credentials.len());

        let service = AuthenticationService::new(
            &config.token_policy()?,
            config.rate_limit_config(),
            config.credential_timeout(),
            credentials,
            store,
        );
        Ok(Self::with_service(config, service))
    }

    pub fn with_service(config: Settings, service: AuthenticationService) -> Self {
        Self {
            config: Arc::new(config),
            auth: Arc::new(service),
        }
    }

    /// Periodic housekeeping: drops elapsed rate-limit windows and expired records.
    pub async fn cleanup(&self) -> Result<()> {
        self.auth.rate_limiter().cleanup().await;
        let purged = self.auth.store().purge_expired(chrono::Utc::now()).await?;
        if purged > 0 {
            info!("Purged {} expired refresh records", purged);
        }
        Ok(())
    }
}
