//! Signing and verification of token payloads.
//!
//! One codec is built per token purpose. Access and refresh codecs hold
//! different secrets, so a token minted for one purpose fails signature
//! verification under the other.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::auth::claims::RegisteredClaims;
use crate::error::AuthError;

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
}

pub struct ClaimsCodec {
    algorithm: Algorithm,
    issuer: String,
    audience: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ClaimsCodec {
    pub fn new(
        secret: &str,
        algorithm: Algorithm,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        let issuer = issuer.into();
        let audience = audience.into();

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[&issuer]);
        validation.set_audience(&[&audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Self {
            algorithm,
            issuer,
            audience,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::IssuanceError(format!("token signing failed: {}", e)))
    }

    /// Checks algorithm, signature, issuer, audience and expiry in one pass.
    pub fn verify<T>(&self, token: &str) -> Result<T, AuthError>
    where
        T: DeserializeOwned + RegisteredClaims,
    {
        self.check_header(token)?;

        let claims = decode::<T>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("token rejected by decoder: {}", e);
                map_decode_error(e.kind())
            })?;

        // The decoder accepts `exp == now`; a token is only live strictly before expiry.
        if chrono::Utc::now().timestamp() >= claims.expires_at() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }

    /// The header's `alg` must name exactly the configured algorithm. This runs
    /// before any key is touched so `none` and its spellings never reach the decoder.
    fn check_header(&self, token: &str) -> Result<(), AuthError> {
        let mut parts = token.split('.');
        let (header, _payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(AuthError::MalformedToken),
        };

        let header_bytes = BASE64URL
            .decode(header)
            .map_err(|_| AuthError::MalformedToken)?;
        let header: RawHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| AuthError::MalformedToken)?;

        // `none` and unknown names fail to parse and count as a mismatch.
        let alg = header.alg.ok_or(AuthError::MalformedToken)?;
        match Algorithm::from_str(&alg) {
            Ok(alg) if alg == self.algorithm => {}
            _ => return Err(AuthError::AlgorithmMismatch),
        }

        if signature.is_empty() {
            return Err(AuthError::SignatureInvalid);
        }
        Ok(())
    }
}

fn map_decode_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => AuthError::AlgorithmMismatch,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => AuthError::ClaimMismatch,
        _ => AuthError::MalformedToken,
    }
}
