use thiserror::Error;

/// Cipher failures. Decryption deliberately has a single variant: callers
/// must not be able to tell a bad key from bad padding or a truncated block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key must be base64 encoding of 32 bytes")]
    InvalidKey,

    #[error("decryption failed")]
    Decryption,
}
