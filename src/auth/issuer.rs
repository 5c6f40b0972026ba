use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, Identity, RefreshClaims};
use crate::auth::codec::ClaimsCodec;
use crate::auth::policy::TokenPolicy;
use crate::db::{RefreshRecord, RefreshStore};
use crate::error::AuthError;

const TOKEN_ID_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// 256 random bits, URL-safe.
pub fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64URL.encode(bytes)
}

pub struct TokenIssuer {
    access: ClaimsCodec,
    refresh: ClaimsCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
    store: Arc<dyn RefreshStore>,
}

impl TokenIssuer {
    pub fn new(policy: &TokenPolicy, store: Arc<dyn RefreshStore>) -> Self {
        Self {
            access: policy.access_codec(),
            refresh: policy.refresh_codec(),
            access_ttl: policy.access_ttl,
            refresh_ttl: policy.refresh_ttl,
            store,
        }
    }

    /// Starts a new lineage for `identity`.
    pub async fn issue(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let (pair, record) = self.mint(identity, Uuid::new_v4())?;
        let lineage_id = record.lineage_id;
        self.store.insert(record).await?;

        info!(username = %identity.username, lineage = %lineage_id, "token pair issued");
        Ok(pair)
    }

    /// Replaces `previous` with a successor in the same lineage.
    ///
    /// Fails with [`AuthError::Conflict`] if `previous` stopped being active
    /// before the store could swap it.
    pub async fn rotate(
        &self,
        identity: &Identity,
        previous: &RefreshRecord,
    ) -> Result<TokenPair, AuthError> {
        let (pair, record) = self.mint(identity, previous.lineage_id)?;
        self.store.rotate(&previous.token_id, record).await?;

        info!(username = %identity.username, lineage = %previous.lineage_id, "token pair rotated");
        Ok(pair)
    }

    /// Signs both tokens without touching the store.
    fn mint(
        &self,
        identity: &Identity,
        lineage_id: Uuid,
    ) -> Result<(TokenPair, RefreshRecord), AuthError> {
        if self.access_ttl <= Duration::zero() || self.refresh_ttl <= Duration::zero() {
            return Err(AuthError::IssuanceError("token lifetimes must be positive".into()));
        }

        let now = Utc::now();
        let iat = now.timestamp();

        let access_claims = AccessClaims {
            sub: identity.username.clone(),
            role: identity.role,
            iss: self.access.issuer().to_string(),
            aud: self.access.audience().to_string(),
            iat,
            exp: iat + self.access_ttl.num_seconds(),
        };
        let access_token = self.access.sign(&access_claims)?;

        let record = RefreshRecord::new(
            generate_token_id(),
            lineage_id,
            identity.username.clone(),
            now,
            self.refresh_ttl,
        );
        let refresh_claims = RefreshClaims {
            sub: identity.username.clone(),
            role: identity.role,
            jti: record.token_id.clone(),
            iss: self.refresh.issuer().to_string(),
            aud: self.refresh.audience().to_string(),
            iat,
            exp: record.expires_at.timestamp(),
        };
        let refresh_token = self.refresh.sign(&refresh_claims)?;

        let pair = TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        };
        Ok((pair, record))
    }
}
