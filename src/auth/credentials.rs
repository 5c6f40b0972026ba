use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::{Choice, ConstantTimeEq};

use crate::auth::claims::Role;
use crate::auth::service::{CredentialCheck, CredentialError, CredentialVerifier};
use crate::config::UserSeed;

/// Fixed account list for development and demos.
///
/// Passwords are held as SHA-256 digests and compared in constant time.
/// This is not a password store; production deployments plug in their own
/// [`CredentialVerifier`].
pub struct StaticCredentials {
    users: HashMap<String, ([u8; 32], Role)>,
    // Compared against for unknown usernames so they cost the same as known ones.
    decoy: [u8; 32],
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

impl StaticCredentials {
    pub fn new(seeds: &[UserSeed]) -> Self {
        let users = seeds
            .iter()
            .map(|seed| (seed.username.clone(), (digest(&seed.password), seed.role)))
            .collect();
        Self {
            users,
            decoy: digest("decoy"),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialCheck, CredentialError> {
        let supplied = digest(password);
        let (expected, role, known) = match self.users.get(username) {
            Some((expected, role)) => (expected, Some(*role), Choice::from(1)),
            None => (&self.decoy, None, Choice::from(0)),
        };

        // Unknown users run the same comparison; `known` masks the result.
        let matches: bool = (expected[..].ct_eq(&supplied[..]) & known).into();
        match role {
            Some(role) if matches => Ok(CredentialCheck::Valid(role)),
            _ => Ok(CredentialCheck::Invalid),
        }
    }
}
