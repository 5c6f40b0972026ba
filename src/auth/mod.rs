//! Authentication module for the authgate server
//!
//! This module handles credential login, token signing and verification,
//! refresh-token rotation and login rate limiting.

mod claims;
mod codec;
mod credentials;
mod issuer;
mod policy;
mod rate_limit;
mod service;
mod verifier;
pub mod handlers;

pub use claims::{AccessClaims, Identity, RefreshClaims, RegisteredClaims, Role};
pub use codec::ClaimsCodec;
pub use credentials::StaticCredentials;
pub use issuer::{generate_token_id, TokenIssuer, TokenPair};
pub use policy::TokenPolicy;
pub use rate_limit::{RateLimitConfig, RateLimitEntry, RateLimiter};
pub use service::{
    AuthenticationService, CredentialCheck, CredentialError, CredentialVerifier, LoginOutcome,
};
pub use verifier::{TokenVerifier, VerifiedRefresh};
