use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;

/// Generate a random 256-bit key for AES-256-CBC.
pub fn generate_key_bytes() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Generate a random 256-bit key, base64-encoded.
pub fn generate_key() -> String {
    key_to_base64(&generate_key_bytes())
}

/// Encode a key to base64 for display/sharing.
pub fn key_to_base64(key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 key.
pub fn key_from_base64(encoded: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = BASE64.decode(encoded).map_err(|_| CryptoError::InvalidKey)?;
    bytes.try_into().map_err(|_| CryptoError::InvalidKey)
}

/// Derive the chat key shared by the owners of two PINs:
/// `base64(SHA256(lo ++ hi))` where `lo <= hi` lexicographically.
///
/// The PINs are put in canonical order first, so both participants get the
/// same key no matter who computes it.
pub fn derive_chat_key(pin_a: &str, pin_b: &str) -> String {
    let (lo, hi) = if pin_a <= pin_b { (pin_a, pin_b) } else { (pin_b, pin_a) };

    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    BASE64.encode(hasher.finalize())
}
