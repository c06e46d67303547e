use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::error::ApiError;

/// One-way password digests. Callers never see which KDF sits behind it.
pub trait CredentialStore: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, ApiError>;

    fn verify(&self, password: &str, digest: &str) -> bool;
}

/// Argon2id with a per-password random salt, PHC-encoded.
///
/// Also accepts bare 64-char hex SHA-256 digests written by the previous
/// backend, so imported accounts keep working until their next reset.
#[derive(Clone)]
pub struct Argon2Credentials {
    argon2: Argon2<'static>,
}

impl Argon2Credentials {
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2Credentials {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl CredentialStore for Argon2Credentials {
    fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("Password hashing failed: {}", e);
                ApiError::Internal
            })
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self.argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) if is_legacy_digest(digest) => {
                let computed = hex::encode(Sha256::digest(password.as_bytes()));
                constant_time_eq(computed.as_bytes(), digest.to_ascii_lowercase().as_bytes())
            }
            Err(_) => false,
        }
    }
}

fn is_legacy_digest(digest: &str) -> bool {
    digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Constant-time comparison of byte slices.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
pub(crate) fn cheap_credentials() -> Argon2Credentials {
    // Minimum cost; keeps the service tests fast in debug builds.
    Argon2Credentials::new(Params::new(8, 1, 1, None).unwrap())
}
