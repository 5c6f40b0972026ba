//! Login, refresh, logout and authorization flows.
//!
//! A session lineage moves through
//! `Anonymous -> Authenticated -> Refreshed* -> Revoked`:
//!
//! * [`AuthenticationService::login`] enters `Authenticated` with a fresh lineage.
//! * [`AuthenticationService::refresh`] rotates into `Refreshed`. Reuse or a lost
//!   rotation race moves the owner's sessions to `Revoked`.
//! * [`AuthenticationService::logout`] moves the presented token to `Revoked`.
//!
//! `Revoked` is terminal; only a new login re-enters `Authenticated`.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::claims::{Identity, Role};
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::policy::TokenPolicy;
use crate::auth::rate_limit::{RateLimitConfig, RateLimiter};
use crate::auth::verifier::TokenVerifier;
use crate::db::RefreshStore;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid(Role),
    Invalid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Credential backend unavailable: {0}")]
    Unavailable(String),
}

/// Username/password lookup owned by the surrounding application.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialCheck, CredentialError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub role: Role,
}

pub struct AuthenticationService {
    credentials: Arc<dyn CredentialVerifier>,
    limiter: Arc<RateLimiter>,
    issuer: TokenIssuer,
    verifier: TokenVerifier,
    store: Arc<dyn RefreshStore>,
    credential_timeout: Duration,
}

/// Rate limiting is keyed on the normalized username so case variants share a counter.
fn rate_limit_key(username: &str) -> String {
    username.trim().to_lowercase()
}

impl AuthenticationService {
    pub fn new(
        policy: &TokenPolicy,
        limits: RateLimitConfig,
        credential_timeout: Duration,
        credentials: Arc<dyn CredentialVerifier>,
        store: Arc<dyn RefreshStore>,
    ) -> Self {
        Self {
            credentials,
            limiter: Arc::new(RateLimiter::new(limits)),
            issuer: TokenIssuer::new(policy, store.clone()),
            verifier: TokenVerifier::new(policy, store.clone()),
            store,
            credential_timeout,
        }
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn store(&self) -> Arc<dyn RefreshStore> {
        self.store.clone()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let key = rate_limit_key(username);

        // Denied keys never reach the credential check. The reservation taken
        // here is settled exactly once below.
        if !self.limiter.try_begin(&key).await {
            warn!(username = %key, "login denied by rate limiter");
            return Err(AuthError::RateLimited);
        }

        let check = tokio::time::timeout(
            self.credential_timeout,
            self.credentials.verify_credentials(username, password),
        )
        .await;

        // Infrastructure failures are not the caller's fault and are not counted.
        let role = match check {
            Err(_) => {
                self.limiter.release(&key).await;
                error!(username = %key, "credential check timed out");
                return Err(AuthError::CredentialServiceUnavailable);
            }
            Ok(Err(e)) => {
                self.limiter.release(&key).await;
                error!(username = %key, "credential check failed: {}", e);
                return Err(AuthError::CredentialServiceUnavailable);
            }
            Ok(Ok(CredentialCheck::Invalid)) => {
                let attempts = self.limiter.record_failure(&key).await;
                info!(username = %key, attempts, "login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Ok(Ok(CredentialCheck::Valid(role))) => role,
        };

        self.limiter.clear(&key).await;
        let identity = Identity::new(username, role);
        let tokens = self.issuer.issue(&identity).await?;

        info!(username = %identity.username, role = %role, "login succeeded");
        Ok(LoginOutcome { tokens, role })
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let verified = self.verifier.verify_refresh(refresh_token).await?;

        match self.issuer.rotate(&verified.identity, &verified.record).await {
            Ok(tokens) => Ok(tokens),
            Err(AuthError::Conflict) => {
                // Someone else rotated this token between lookup and swap.
                let revoked = self.store.revoke_lineage(&verified.identity.username).await?;
                warn!(
                    username = %verified.identity.username,
                    token_id = %verified.token_id,
                    revoked,
                    "concurrent refresh detected, sessions revoked"
                );
                Err(AuthError::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    /// Revokes the presented refresh token. Unusable tokens are accepted silently.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        match self.verifier.decode_refresh(refresh_token) {
            Ok(claims) => {
                self.store.revoke(&claims.jti).await?;
                info!(username = %claims.sub, "logged out");
            }
            Err(e) => debug!(reason = %e, "logout with unusable refresh token"),
        }
        Ok(())
    }

    /// Verifies an access token and checks it grants at least `required`.
    pub fn authorize(&self, access_token: &str, required: Role) -> Result<Identity, AuthError> {
        let identity = self.verifier.verify_access(access_token)?;
        if !identity.role.satisfies(required) {
            warn!(username = %identity.username, role = %identity.role, required = %required, "insufficient role");
            return Err(AuthError::Forbidden);
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryRefreshStore;
    use chrono::Utc;
    use jsonwebtoken::Algorithm;
    use mockall::predicate::eq;
    use tokio_test::{assert_err, assert_ok};

    fn policy() -> TokenPolicy {
        TokenPolicy {
            access_secret: "service-test-access".to_string(),
            refresh_secret: "service-test-refresh".to_string(),
            issuer: "authgate".to_string(),
            audience: "authgate-clients".to_string(),
            algorithm: Algorithm::HS256,
            access_ttl: chrono::Duration::minutes(15),
            refresh_ttl: chrono::Duration::days(7),
        }
    }

    fn service_with(mock: MockCredentialVerifier) -> (AuthenticationService, InMemoryRefreshStore) {
        let store = InMemoryRefreshStore::new();
        let service = AuthenticationService::new(
            &policy(),
            RateLimitConfig::default(),
            Duration::from_millis(200),
            Arc::new(mock),
            Arc::new(store.clone()),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_login_success_issues_tokens() {
        let mut mock = MockCredentialVerifier::new();
        mock.expect_verify_credentials()
            .with(eq("admin"), eq("adminpass"))
            .times(1)
            .returning(|_, _| Ok(CredentialCheck::Valid(Role::Admin)));
        let (service, store) = service_with(mock);

        let outcome = assert_ok!(service.login("admin", "adminpass").await);
        assert_eq!(outcome.role, Role::Admin);
        assert_eq!(store.snapshot().await.len(), 1);

        let identity = assert_ok!(service.authorize(&outcome.tokens.access_token, Role::Admin));
        assert_eq!(identity.username, "admin");
    }

    #[tokio::test]
    async fn test_rate_limited_login_skips_credential_check() {
        let mut mock = MockCredentialVerifier::new();
        // Exactly five lookups; the sixth attempt must not reach the collaborator.
        mock.expect_verify_credentials()
            .times(5)
            .returning(|_, _| Ok(CredentialCheck::Invalid));
        let (service, store) = service_with(mock);

        for _ in 0..5 {
            let result = service.login("admin", "wrong").await;
            assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
        }

        let result = service.login("admin", "adminpass").await;
        assert_eq!(result.unwrap_err(), AuthError::RateLimited);

        // Case variants share the counter
        let result = service.login("ADMIN", "adminpass").await;
        assert_eq!(result.unwrap_err(), AuthError::RateLimited);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_success_clears_failures() {
        let mut mock = MockCredentialVerifier::new();
        mock.expect_verify_credentials()
            .with(eq("alice"), eq("wrong"))
            .returning(|_, _| Ok(CredentialCheck::Invalid));
        mock.expect_verify_credentials()
            .with(eq("alice"), eq("right"))
            .returning(|_, _| Ok(CredentialCheck::Valid(Role::User)));
        let (service, _) = service_with(mock);

        for _ in 0..4 {
            assert_err!(service.login("alice", "wrong").await);
        }
        assert_ok!(service.login("alice", "right").await);
        assert_eq!(service.rate_limiter().attempts("alice").await, 0);

        // A fresh window: four more failures are still allowed
        for _ in 0..4 {
            let result = service.login("alice", "wrong").await;
            assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
        }
        assert_ok!(service.login("alice", "right").await);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_counted() {
        let mut mock = MockCredentialVerifier::new();
        mock.expect_verify_credentials()
            .returning(|_, _| Err(CredentialError::Unavailable("ldap down".into())));
        let (service, store) = service_with(mock);

        for _ in 0..10 {
            let result = service.login("admin", "adminpass").await;
            assert_eq!(result.unwrap_err(), AuthError::CredentialServiceUnavailable);
        }
        assert_eq!(service.rate_limiter().attempts("admin").await, 0);
        assert!(store.snapshot().await.is_empty());
    }

    struct SlowCredentials;

    #[async_trait]
    impl CredentialVerifier for SlowCredentials {
        async fn verify_credentials(
            &self,
            _username: &str,
            _password: &str,
        ) -> Result<CredentialCheck, CredentialError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CredentialCheck::Invalid)
        }
    }

    #[tokio::test]
    async fn test_timed_out_check_is_not_counted() {
        let store = InMemoryRefreshStore::new();
        let service = AuthenticationService::new(
            &policy(),
            RateLimitConfig::default(),
            Duration::from_millis(50),
            Arc::new(SlowCredentials),
            Arc::new(store.clone()),
        );

        // More timeouts than the limit: each reservation is handed back
        for _ in 0..6 {
            let result = service.login("admin", "adminpass").await;
            assert_eq!(result.unwrap_err(), AuthError::CredentialServiceUnavailable);
        }
        assert_eq!(service.rate_limiter().attempts("admin").await, 0);
        assert!(service.rate_limiter().check_allowed("admin").await);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_replay_revokes() {
        let mut mock = MockCredentialVerifier::new();
        mock.expect_verify_credentials()
            .returning(|_, _| Ok(CredentialCheck::Valid(Role::Admin)));
        let (service, store) = service_with(mock);

        let login = service.login("admin", "adminpass").await.unwrap();
        let rotated = assert_ok!(service.refresh(&login.tokens.refresh_token).await);
        assert_ne!(rotated.refresh_token, login.tokens.refresh_token);

        let replay = service.refresh(&login.tokens.refresh_token).await;
        assert_eq!(replay.unwrap_err(), AuthError::ReuseDetected);

        // The legitimate successor is revoked too
        let result = service.refresh(&rotated.refresh_token).await;
        assert_eq!(result.unwrap_err(), AuthError::ReuseDetected);
        let now = Utc::now();
        assert!(store.snapshot().await.iter().all(|r| !r.is_active(now)));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let mut mock = MockCredentialVerifier::new();
        mock.expect_verify_credentials()
            .returning(|_, _| Ok(CredentialCheck::Valid(Role::User)));
        let (service, _) = service_with(mock);

        let login = service.login("alice", "pw").await.unwrap();
        assert_ok!(service.logout(&login.tokens.refresh_token).await);

        assert_err!(service.refresh(&login.tokens.refresh_token).await);
        // Garbage is accepted without error
        assert_ok!(service.logout("not-a-token").await);
    }

    #[tokio::test]
    async fn test_authorize_enforces_role() {
        let mut mock = MockCredentialVerifier::new();
        mock.expect_verify_credentials()
            .returning(|_, _| Ok(CredentialCheck::Valid(Role::User)));
        let (service, _) = service_with(mock);

        let login = service.login("alice", "pw").await.unwrap();
        assert_ok!(service.authorize(&login.tokens.access_token, Role::User));
        assert_eq!(
            service.authorize(&login.tokens.access_token, Role::Admin).unwrap_err(),
            AuthError::Forbidden
        );
        assert_eq!(
            service.authorize("junk", Role::User).unwrap_err(),
            AuthError::MalformedToken
        );
    }
}
