use std::sync::Arc;
use tracing::warn;

use crate::auth::claims::{AccessClaims, Identity, RefreshClaims};
use crate::auth::codec::ClaimsCodec;
use crate::auth::policy::TokenPolicy;
use crate::db::{RefreshRecord, RefreshStore};
use crate::error::AuthError;

/// A refresh token whose signature checked out and whose record is live.
#[derive(Debug, Clone)]
pub struct VerifiedRefresh {
    pub identity: Identity,
    pub token_id: String,
    pub record: RefreshRecord,
}

pub struct TokenVerifier {
    access: ClaimsCodec,
    refresh: ClaimsCodec,
    store: Arc<dyn RefreshStore>,
}

impl TokenVerifier {
    pub fn new(policy: &TokenPolicy, store: Arc<dyn RefreshStore>) -> Self {
        Self {
            access: policy.access_codec(),
            refresh: policy.refresh_codec(),
            store,
        }
    }

    pub fn verify_access(&self, token: &str) -> Result<Identity, AuthError> {
        self.access
            .verify::<AccessClaims>(token)
            .map(|claims| claims.identity())
            .map_err(|e| {
                warn!(reason = %e, "access token rejected");
                e
            })
    }

    /// Signature and claims only. The store is not consulted.
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.refresh.verify::<RefreshClaims>(token)
    }

    /// Validates a refresh token against its stored record.
    ///
    /// A correctly signed token without a matching active record has already
    /// been rotated or revoked. That is treated as theft: every session of the
    /// owner is revoked before [`AuthError::ReuseDetected`] is returned.
    pub async fn verify_refresh(&self, token: &str) -> Result<VerifiedRefresh, AuthError> {
        let claims = self.decode_refresh(token).map_err(|e| {
            warn!(reason = %e, "refresh token rejected");
            e
        })?;

        match self.store.find_active(&claims.jti).await? {
            Some(record) if record.username == claims.sub => Ok(VerifiedRefresh {
                identity: claims.identity(),
                token_id: claims.jti,
                record,
            }),
            _ => {
                self.revoke_on_reuse(&claims).await?;
                Err(AuthError::ReuseDetected)
            }
        }
    }

    async fn revoke_on_reuse(&self, claims: &RefreshClaims) -> Result<(), AuthError> {
        let revoked = self.store.revoke_lineage(&claims.sub).await?;
        warn!(
            username = %claims.sub,
            token_id = %claims.jti,
            revoked,
            "refresh token reuse detected, sessions revoked"
        );
        Ok(())
    }
}
