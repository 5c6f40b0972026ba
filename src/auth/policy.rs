use chrono::Duration;
use jsonwebtoken::Algorithm;
use std::fmt;

use crate::auth::codec::ClaimsCodec;

/// Everything the issuer and verifier need to agree on, passed in explicitly
/// at construction so each test can run with its own secrets.
#[derive(Clone)]
pub struct TokenPolicy {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenPolicy {
    pub fn access_codec(&self) -> ClaimsCodec {
        ClaimsCodec::new(&self.access_secret, self.algorithm, &self.issuer, &self.audience)
    }

    pub fn refresh_codec(&self) -> ClaimsCodec {
        ClaimsCodec::new(&self.refresh_secret, self.algorithm, &self.issuer, &self.audience)
    }
}

impl fmt::Debug for TokenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPolicy")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}
